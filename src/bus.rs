use std::collections::VecDeque;

use bitflags::bitflags;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::memory::linear_to_cache_order;
use crate::timing::{BoardConfig, HardwareTiming, TimingProfile};

bitflags! {
    /// Window selects seen in phase 2, already converted to "selected" polarity.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct BusWindows: u8 {
        const ROML = 0b0000_0001;
        const ROMH = 0b0000_0010;
        const IO1 = 0b0000_0100;
        const IO2 = 0b0000_1000;
        const VIC = 0b0001_0000;
        const BA = 0b0010_0000;
    }
}

bitflags! {
    /// Output lines towards the guest, set bit = line high (released).
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ControlLines: u8 {
        const GAME = 0b0001;
        const EXROM = 0b0010;
        const NMI = 0b0100;
        const DMA = 0b1000;
    }
}

impl ControlLines {
    #[must_use]
    pub fn released() -> Self {
        ControlLines::all()
    }

    #[inline]
    #[must_use]
    pub fn nmi_asserted(&self) -> bool {
        !self.contains(ControlLines::NMI)
    }

    #[inline]
    #[must_use]
    pub fn dma_asserted(&self) -> bool {
        !self.contains(ControlLines::DMA)
    }
}

impl Default for ControlLines {
    fn default() -> Self {
        Self::released()
    }
}

/// Raw access to the expansion port. One implementation talks to GPIO
/// registers; `ReplayBus` plays back recorded cycles.
pub trait BusLines {
    /// First read of the cycle: A0..A7 and the control inputs.
    fn read_phase1(&mut self) -> u32;
    /// Flips the address multiplexer to the A8..A12 / window-select side.
    fn select_high_address(&mut self);
    fn read_phase2(&mut self) -> u32;
    fn read_data(&mut self) -> u8;
    fn drive_data(&mut self, data: u8);
    fn release_data(&mut self);
    fn set_control(&mut self, lines: ControlLines);
}

#[inline]
fn pin(word: u32, pin: u32) -> bool {
    word & (1 << (pin - 1)) != 0
}

fn read_pins_u8(word: u32, pins: &[u32]) -> u8 {
    let mut shift: u8 = 1;
    let mut r: u8 = 0;
    for p in pins.iter() {
        if pin(word, *p) {
            r |= shift;
        }
        shift <<= 1;
    }
    r
}

fn write_pins(mut word: u32, data: u8, pins: &[u32]) -> u32 {
    let mut shift: u8 = 1;
    for p in pins.iter() {
        if data & shift != 0 {
            word |= 1 << (*p - 1);
        } else {
            word &= !(1 << (*p - 1));
        }
        shift <<= 1;
    }
    word
}

/// What phase 1 yields: enough to decide between the video and CPU half.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarlySample {
    addr_lo: u8,
    read: bool,
    reset: bool,
    button: bool,
    vic_half: bool,
}

impl EarlySample {
    #[must_use]
    pub fn from_word(word: u32) -> Self {
        Self {
            addr_lo: read_pins_u8(word, &ADDR_LO_PINS),
            read: pin(word, BUS_PIN_RW),
            reset: !pin(word, BUS_PIN_RESET),
            button: !pin(word, BUS_PIN_BUTTON),
            vic_half: !pin(word, BUS_PIN_PHI2),
        }
    }

    #[inline]
    #[must_use]
    pub fn vic_half(&self) -> bool {
        self.vic_half
    }

    #[inline]
    #[must_use]
    pub fn addr_lo(&self) -> u8 {
        self.addr_lo
    }
}

/// One guest cycle as seen from the port. Built fresh every cycle.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusCycleSample {
    addr_lo: u8,
    addr_hi: u8,
    windows: BusWindows,
    read: bool,
    data: u8,
    reset: bool,
    button: bool,
}

impl BusCycleSample {
    fn from_phases(early: EarlySample, word: u32) -> Self {
        let mut windows = BusWindows::empty();
        windows.set(BusWindows::ROML, !pin(word, BUS_PIN_ROML));
        windows.set(BusWindows::ROMH, !pin(word, BUS_PIN_ROMH));
        windows.set(BusWindows::IO1, !pin(word, BUS_PIN_IO1));
        windows.set(BusWindows::IO2, !pin(word, BUS_PIN_IO2));
        windows.set(BusWindows::VIC, early.vic_half);
        windows.set(BusWindows::BA, pin(word, BUS_PIN_BA));
        Self {
            addr_lo: early.addr_lo,
            addr_hi: read_pins_u8(word, &ADDR_HI_PINS),
            windows,
            read: early.read,
            data: 0,
            reset: early.reset,
            button: early.button,
        }
    }

    /// A CPU read of `window_offset` through the given window, BA high.
    #[must_use]
    pub fn cpu_read(windows: BusWindows, window_offset: u16) -> Self {
        Self {
            addr_lo: (window_offset & 0xff) as u8,
            addr_hi: ((window_offset >> 8) & 0x1f) as u8,
            windows: windows | BusWindows::BA,
            read: true,
            data: 0,
            reset: false,
            button: false,
        }
    }

    #[must_use]
    pub fn cpu_write(windows: BusWindows, window_offset: u16, data: u8) -> Self {
        Self {
            read: false,
            data,
            ..Self::cpu_read(windows, window_offset)
        }
    }

    /// A cycle that touches none of the cartridge windows.
    #[must_use]
    pub fn idle(read: bool) -> Self {
        Self {
            read,
            ..Self::cpu_read(BusWindows::empty(), 0)
        }
    }

    #[must_use]
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    #[must_use]
    pub fn with_button(mut self, button: bool) -> Self {
        self.button = button;
        self
    }

    /// 13-bit offset inside the selected window.
    #[inline]
    #[must_use]
    pub fn address(&self) -> u16 {
        ((self.addr_hi as u16) << 8) | self.addr_lo as u16
    }

    /// Offset in cache order, assembled straight from the two sampling phases.
    #[inline]
    #[must_use]
    pub fn cache_offset(&self) -> u16 {
        ((self.addr_lo as u16) << 5) | self.addr_hi as u16
    }

    #[inline]
    #[must_use]
    pub fn io_address(&self) -> u8 {
        self.addr_lo
    }

    #[inline]
    #[must_use]
    pub fn windows(&self) -> BusWindows {
        self.windows
    }

    #[inline]
    #[must_use]
    pub fn selects(&self, w: BusWindows) -> bool {
        self.windows.intersects(w)
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> u8 {
        self.data
    }

    #[inline]
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.read
    }

    #[inline]
    #[must_use]
    pub fn reset(&self) -> bool {
        self.reset
    }

    #[inline]
    #[must_use]
    pub fn button(&self) -> bool {
        self.button
    }

    #[inline]
    #[must_use]
    pub fn vic_half(&self) -> bool {
        self.windows.contains(BusWindows::VIC)
    }

    #[inline]
    #[must_use]
    pub fn cpu_reads(&self) -> bool {
        self.read && !self.vic_half()
    }

    #[inline]
    #[must_use]
    pub fn cpu_writes(&self) -> bool {
        !self.read && !self.vic_half()
    }

    /// The VIC holds BA low and fetches during the CPU half.
    #[inline]
    #[must_use]
    pub fn badline(&self) -> bool {
        !self.vic_half() && !self.windows.contains(BusWindows::BA)
    }
}

impl core::fmt::Debug for BusCycleSample {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{{ addr:{:04x} {} data:{:02x} windows:{:?} reset:{:?} button:{:?} }}",
            self.address(),
            if self.read { "R" } else { "W" },
            self.data,
            self.windows,
            self.reset,
            self.button
        )
    }
}

/// Two-phase sampling, each phase gated on its settle deadline.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct BusSampler {
    board: BoardConfig,
}

impl BusSampler {
    #[must_use]
    pub fn new(board: BoardConfig) -> Self {
        Self { board }
    }

    #[must_use]
    pub fn board(&self) -> BoardConfig {
        self.board
    }

    pub fn sample_phase1<L: BusLines, H: HardwareTiming>(
        &self,
        lines: &mut L,
        hw: &mut H,
        timing: &TimingProfile,
    ) -> EarlySample {
        hw.wait_until(timing.signal_settle());
        EarlySample::from_word(lines.read_phase1())
    }

    pub fn sample_phase2<L: BusLines, H: HardwareTiming>(
        &self,
        early: EarlySample,
        lines: &mut L,
        hw: &mut H,
        timing: &TimingProfile,
    ) -> BusCycleSample {
        lines.select_high_address();
        let settle = if early.vic_half {
            let extra = if self.board.c128_mode { C128_MULTIPLEXER_EXTRA } else { 0 };
            timing.multiplexer_settle_vic2() + extra
        } else {
            timing.multiplexer_settle()
        };
        hw.wait_until(settle);
        let mut sample = BusCycleSample::from_phases(early, lines.read_phase2());
        if !sample.read {
            let latch = if early.vic_half { timing.write_latch_vic2() } else { timing.write_latch() };
            hw.wait_until(latch);
            sample.data = lines.read_data();
        }
        trace!("sample {:?}", sample);
        sample
    }

    /// Second look at A8..A12 and the selects after a badline fetch has been
    /// prepared. Long boards keep the first sample.
    pub fn resample_phase2<L: BusLines>(&self, sample: BusCycleSample, lines: &mut L) -> BusCycleSample {
        if self.board.long_board {
            return sample;
        }
        let early = EarlySample {
            addr_lo: sample.addr_lo,
            read: sample.read,
            reset: sample.reset,
            button: sample.button,
            vic_half: sample.vic_half(),
        };
        let mut again = BusCycleSample::from_phases(early, lines.read_phase2());
        again.data = sample.data;
        again
    }
}

/// A recorded cycle for `ReplayBus`, in terms of logical levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedCycle {
    pub phase1: u32,
    pub phase2: u32,
    pub data: u8,
}

impl RecordedCycle {
    /// Encodes a logical cycle into the raw pin words the sampler expects.
    #[must_use]
    pub fn encode(address: u16, windows: BusWindows, read: bool, data: u8, reset: bool, button: bool) -> Self {
        let mut phase1 = write_pins(0, (address & 0xff) as u8, &ADDR_LO_PINS);
        if read {
            phase1 |= 1 << (BUS_PIN_RW - 1);
        }
        if !reset {
            phase1 |= 1 << (BUS_PIN_RESET - 1);
        }
        if !windows.contains(BusWindows::VIC) {
            phase1 |= 1 << (BUS_PIN_PHI2 - 1);
        }
        if !button {
            phase1 |= 1 << (BUS_PIN_BUTTON - 1);
        }

        let mut phase2 = write_pins(0, ((address >> 8) & 0x1f) as u8, &ADDR_HI_PINS);
        for (flag, p) in [
            (BusWindows::ROML, BUS_PIN_ROML),
            (BusWindows::ROMH, BUS_PIN_ROMH),
            (BusWindows::IO1, BUS_PIN_IO1),
            (BusWindows::IO2, BUS_PIN_IO2),
        ] {
            if !windows.contains(flag) {
                phase2 |= 1 << (p - 1);
            }
        }
        if windows.contains(BusWindows::BA) {
            phase2 |= 1 << (BUS_PIN_BA - 1);
        }

        Self { phase1, phase2, data }
    }

    #[must_use]
    pub fn from_sample(s: &BusCycleSample) -> Self {
        Self::encode(s.address(), s.windows(), s.is_read(), s.data(), s.reset(), s.button())
    }
}

/// Plays back recorded cycles and records what the engine drove.
#[derive(Debug, Default)]
pub struct ReplayBus {
    cycles: VecDeque<RecordedCycle>,
    current: Option<RecordedCycle>,
    high_selected: bool,
    driven: Vec<Option<u8>>,
    control: Vec<ControlLines>,
    phase2_reads: u64,
}

impl ReplayBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cycle: RecordedCycle) {
        self.cycles.push_back(cycle);
    }

    pub fn push_sample(&mut self, sample: &BusCycleSample) {
        self.push(RecordedCycle::from_sample(sample));
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.cycles.len()
    }

    /// Byte driven in each finished cycle, `None` when the bus was left alone.
    #[must_use]
    pub fn driven(&self) -> &[Option<u8>] {
        &self.driven
    }

    #[must_use]
    pub fn last_driven(&self) -> Option<u8> {
        self.driven.last().copied().flatten()
    }

    #[must_use]
    pub fn control(&self) -> ControlLines {
        self.control.last().copied().unwrap_or_default()
    }

    #[must_use]
    pub fn control_history(&self) -> &[ControlLines] {
        &self.control
    }

    #[must_use]
    pub fn phase2_reads(&self) -> u64 {
        self.phase2_reads
    }

    /// Forgets what was driven so far; queued cycles stay.
    pub fn clear_history(&mut self) {
        self.driven.clear();
        self.control.clear();
    }
}

impl BusLines for ReplayBus {
    fn read_phase1(&mut self) -> u32 {
        self.current = self.cycles.pop_front();
        self.high_selected = false;
        self.driven.push(None);
        self.current.map(|c| c.phase1).unwrap_or(u32::MAX)
    }

    fn select_high_address(&mut self) {
        self.high_selected = true;
    }

    fn read_phase2(&mut self) -> u32 {
        self.phase2_reads += 1;
        if !self.high_selected {
            return 0;
        }
        self.current.map(|c| c.phase2).unwrap_or(u32::MAX)
    }

    fn read_data(&mut self) -> u8 {
        self.current.map(|c| c.data).unwrap_or(0xff)
    }

    fn drive_data(&mut self, data: u8) {
        if let Some(d) = self.driven.last_mut() {
            *d = Some(data);
        }
    }

    fn release_data(&mut self) {}

    fn set_control(&mut self, lines: ControlLines) {
        self.control.push(lines);
    }
}
