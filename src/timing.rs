use std::hint::black_box;

use hashbrown::HashMap;
use lazy_static::lazy_static;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::*;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("timing override #{index} is not a number: {value:?}")]
    NotANumber { index: usize, value: String },
    #[error("too many timing overrides: {0} given, at most {TIMING_OVERRIDE_COUNT} allowed")]
    TooManyOverrides(usize),
    #[error("unknown board preset {0:?}")]
    UnknownPreset(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoardPreset {
    Rpi3PlusC64,
    Rpi3PlusC64C128,
    RpiZero2C64,
    RpiZero2C64C128,
}

impl BoardPreset {
    pub const ALL: [BoardPreset; 4] = [
        BoardPreset::Rpi3PlusC64,
        BoardPreset::Rpi3PlusC64C128,
        BoardPreset::RpiZero2C64,
        BoardPreset::RpiZero2C64C128,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BoardPreset::Rpi3PlusC64 => "rpi3plus-c64",
            BoardPreset::Rpi3PlusC64C128 => "rpi3plus-c64c128",
            BoardPreset::RpiZero2C64 => "rpizero2-c64",
            BoardPreset::RpiZero2C64C128 => "rpizero2-c64c128",
        }
    }
}

lazy_static! {
    static ref PRESETS: HashMap<&'static str, TimingProfile> = {
        let mut m = HashMap::new();
        m.insert(BoardPreset::Rpi3PlusC64.name(), TimingProfile::new());
        m.insert(BoardPreset::Rpi3PlusC64C128.name(), TimingProfile {
            signal_settle: 60,
            multiplexer_settle: 220,
            ..TimingProfile::new()
        });
        // 1200MHz, core and SDRAM at 550MHz
        m.insert(BoardPreset::RpiZero2C64.name(), TimingProfile {
            signal_settle: 35,
            multiplexer_settle: 160,
            read_drive: 370,
            write_latch: 380,
            read_badline: 360,
            read_vic2: 350,
            write_latch_vic2: 404,
            multiplexer_settle_vic2: 230,
            stall_assert: 480,
            stall_release: 480,
        });
        m.insert(BoardPreset::RpiZero2C64C128.name(), TimingProfile {
            signal_settle: 40,
            multiplexer_settle: 170,
            read_drive: 441,
            write_latch: 436,
            read_badline: 371,
            read_vic2: 413,
            write_latch_vic2: 469,
            multiplexer_settle_vic2: 246,
            stall_assert: 520,
            stall_release: 520,
        });
        m
    };
}

/// Deadlines in host cycle-counter ticks, measured from the clock edge that
/// started the guest cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingProfile {
    signal_settle: u32,
    multiplexer_settle: u32,
    read_drive: u32,
    write_latch: u32,
    read_badline: u32,
    read_vic2: u32,
    write_latch_vic2: u32,
    multiplexer_settle_vic2: u32,
    stall_assert: u32,
    stall_release: u32,
}

impl TimingProfile {
    #[must_use]
    pub fn new() -> Self {
        Self {
            signal_settle: WAIT_FOR_SIGNALS,
            multiplexer_settle: WAIT_CYCLE_MULTIPLEXER,
            read_drive: WAIT_CYCLE_READ,
            write_latch: WAIT_CYCLE_WRITEDATA,
            read_badline: WAIT_CYCLE_READ_BADLINE,
            read_vic2: WAIT_CYCLE_READ_VIC2,
            write_latch_vic2: WAIT_CYCLE_WRITEDATA_VIC2,
            multiplexer_settle_vic2: WAIT_CYCLE_MULTIPLEXER_VIC2,
            stall_assert: WAIT_TRIGGER_DMA,
            stall_release: WAIT_RELEASE_DMA,
        }
    }

    #[must_use]
    pub fn preset(preset: BoardPreset) -> Self {
        PRESETS.get(preset.name()).copied().unwrap_or_default()
    }

    pub fn by_name(name: &str) -> Result<Self, ConfigError> {
        PRESETS
            .get(name.trim())
            .copied()
            .ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))
    }

    /// Applies a comma separated override list in the order signals, read,
    /// write, badline, read VIC, write VIC, mux, mux VIC, DMA trigger, DMA
    /// release. Empty entries and zeros keep the current value.
    pub fn with_overrides(mut self, list: &str) -> Result<Self, ConfigError> {
        let entries: Vec<&str> = list.split(',').map(str::trim).collect();
        if entries.len() > TIMING_OVERRIDE_COUNT {
            return Err(ConfigError::TooManyOverrides(entries.len()));
        }

        for (index, entry) in entries.iter().enumerate() {
            if entry.is_empty() {
                continue;
            }
            let value: u32 = entry.parse().map_err(|_| ConfigError::NotANumber {
                index,
                value: entry.to_string(),
            })?;
            if value == 0 {
                continue;
            }
            let slot = match index {
                0 => &mut self.signal_settle,
                1 => &mut self.read_drive,
                2 => &mut self.write_latch,
                3 => &mut self.read_badline,
                4 => &mut self.read_vic2,
                5 => &mut self.write_latch_vic2,
                6 => &mut self.multiplexer_settle,
                7 => &mut self.multiplexer_settle_vic2,
                8 => &mut self.stall_assert,
                _ => &mut self.stall_release,
            };
            *slot = value;
        }
        debug!("timing profile: {:?}", self);
        Ok(self)
    }

    #[inline]
    #[must_use]
    pub fn signal_settle(&self) -> u32 {
        self.signal_settle
    }

    #[inline]
    #[must_use]
    pub fn multiplexer_settle(&self) -> u32 {
        self.multiplexer_settle
    }

    #[inline]
    #[must_use]
    pub fn read_drive(&self) -> u32 {
        self.read_drive
    }

    #[inline]
    #[must_use]
    pub fn write_latch(&self) -> u32 {
        self.write_latch
    }

    #[inline]
    #[must_use]
    pub fn read_badline(&self) -> u32 {
        self.read_badline
    }

    #[inline]
    #[must_use]
    pub fn read_vic2(&self) -> u32 {
        self.read_vic2
    }

    #[inline]
    #[must_use]
    pub fn write_latch_vic2(&self) -> u32 {
        self.write_latch_vic2
    }

    #[inline]
    #[must_use]
    pub fn multiplexer_settle_vic2(&self) -> u32 {
        self.multiplexer_settle_vic2
    }

    #[inline]
    #[must_use]
    pub fn stall_assert(&self) -> u32 {
        self.stall_assert
    }

    #[inline]
    #[must_use]
    pub fn stall_release(&self) -> u32 {
        self.stall_release
    }
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    pub c128_mode: bool,
    pub long_board: bool,
}

impl BoardConfig {
    /// Long electrical paths: a C128, or a board whose VIC timing mode is 0.
    #[must_use]
    pub fn from_modes(c128_mode: bool, vic_mode: u8) -> Self {
        Self {
            c128_mode,
            long_board: c128_mode || vic_mode == 0,
        }
    }
}

/// The only place where wall-clock time and the host cache are touched.
/// Everything above this seam is plain state-machine logic.
pub trait HardwareTiming {
    /// Marks the start of a guest cycle (the clock edge that raised the interrupt).
    fn restart(&mut self);
    /// Ticks elapsed since `restart`.
    fn elapsed(&self) -> u32;
    /// Busy-waits until `deadline` ticks have elapsed. Never yields.
    fn wait_until(&mut self, deadline: u32);
    /// Cache preload hint for a range about to be read.
    fn prefetch(&mut self, data: &[u8]);
    /// Touches every byte so the range really lands in the cache.
    fn force_read(&mut self, data: &[u8]) {
        let mut acc = 0u8;
        for b in data {
            acc ^= black_box(*b);
        }
        black_box(acc);
    }
}

/// Deterministic clock: waiting jumps straight to the deadline. Used for
/// trace replay on the host and in tests.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StepClock {
    now: u32,
    total: u64,
    latest_deadline: u32,
    prefetched_bytes: u64,
    forced_bytes: u64,
    restarts: u64,
}

impl StepClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets time pass without waiting, e.g. to model slow handler code.
    pub fn advance(&mut self, ticks: u32) {
        self.now = self.now.saturating_add(ticks);
        self.total += ticks as u64;
    }

    #[must_use]
    pub fn latest_deadline(&self) -> u32 {
        self.latest_deadline
    }

    #[must_use]
    pub fn prefetched_bytes(&self) -> u64 {
        self.prefetched_bytes
    }

    #[must_use]
    pub fn forced_bytes(&self) -> u64 {
        self.forced_bytes
    }

    #[must_use]
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    #[must_use]
    pub fn total_ticks(&self) -> u64 {
        self.total
    }
}

impl HardwareTiming for StepClock {
    fn restart(&mut self) {
        self.now = 0;
        self.latest_deadline = 0;
        self.restarts += 1;
    }

    fn elapsed(&self) -> u32 {
        self.now
    }

    fn wait_until(&mut self, deadline: u32) {
        if deadline > self.now {
            self.total += (deadline - self.now) as u64;
            self.now = deadline;
        }
        self.latest_deadline = self.latest_deadline.max(deadline);
        trace!("wait until {} (now {})", deadline, self.now);
    }

    fn prefetch(&mut self, data: &[u8]) {
        self.prefetched_bytes += data.len() as u64;
    }

    fn force_read(&mut self, data: &[u8]) {
        self.forced_bytes += data.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    macro_rules! T {
        ($b: expr) => {
            assert!($b);
        };
    }

    #[test]
    fn default_profile_is_the_rpi3_c64_preset() {
        T!(TimingProfile::preset(BoardPreset::Rpi3PlusC64) == TimingProfile::new());
        T!(TimingProfile::new().read_drive() == 475);
        T!(TimingProfile::new().stall_release() == 600);
    }

    #[test]
    fn every_preset_is_registered() {
        for p in BoardPreset::ALL {
            T!(TimingProfile::by_name(p.name()).is_ok());
        }
        let zero = TimingProfile::preset(BoardPreset::RpiZero2C64);
        T!(zero.signal_settle() == 35);
        T!(zero.multiplexer_settle_vic2() == 230);
        let c128 = TimingProfile::preset(BoardPreset::Rpi3PlusC64C128);
        T!(c128.signal_settle() == 60);
        T!(c128.read_drive() == 475);
    }

    #[test]
    fn unknown_preset_is_an_error() {
        T!(matches!(TimingProfile::by_name("amiga"), Err(ConfigError::UnknownPreset(_))));
    }

    #[test]
    fn overrides_follow_the_config_order() {
        let p = TimingProfile::new().with_overrides("45, 0, 480,,,,210").unwrap();
        T!(p.signal_settle() == 45);
        T!(p.read_drive() == 475);
        T!(p.write_latch() == 480);
        T!(p.multiplexer_settle() == 210);
        T!(p.stall_assert() == 600);
    }

    #[test]
    fn overrides_reject_garbage() {
        T!(matches!(
            TimingProfile::new().with_overrides("40,abc"),
            Err(ConfigError::NotANumber { index: 1, .. })
        ));
        T!(matches!(
            TimingProfile::new().with_overrides("1,2,3,4,5,6,7,8,9,10,11"),
            Err(ConfigError::TooManyOverrides(11))
        ));
    }

    #[test]
    fn long_board_follows_c128_or_vic_mode() {
        T!(BoardConfig::from_modes(true, 1).long_board);
        T!(BoardConfig::from_modes(false, 0).long_board);
        T!(!BoardConfig::from_modes(false, 1).long_board);
    }

    #[test]
    fn step_clock_jumps_to_deadlines() {
        let mut c = StepClock::new();
        c.restart();
        c.wait_until(40);
        c.wait_until(20);
        T!(c.elapsed() == 40);
        c.advance(5);
        c.wait_until(200);
        T!(c.elapsed() == 200);
        T!(c.latest_deadline() == 200);
        c.restart();
        T!(c.elapsed() == 0);
        T!(c.total_ticks() == 200);
    }
}
