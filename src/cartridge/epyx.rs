use log::trace;
use serde::{Deserialize, Serialize};

use super::{CartCore, CartridgeI, MemoryMode};
use crate::bus::{BusCycleSample, BusWindows};
use crate::consts::*;
use crate::memory::Window;

/// The capacitor of the Epyx FastLoad: ROM stays visible while the guest
/// keeps touching it and disappears shortly after it stops.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EpyxFastload {
    countdown: u32,
}

impl EpyxFastload {
    pub fn new() -> Self {
        Self { countdown: 0 }
    }

    #[must_use]
    pub fn countdown(&self) -> u32 {
        self.countdown
    }
}

impl CartridgeI for EpyxFastload {
    fn reinit(&mut self, core: &mut CartCore) {
        self.countdown = EPYX_CAPACITOR_CYCLES;
        core.set_mode(MemoryMode::Mode8K);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        let mut out = None;
        if sample.cpu_reads() {
            if sample.selects(BusWindows::ROML) {
                self.countdown = EPYX_CAPACITOR_CYCLES;
                out = Some(core.read_rom(Window::RomL, sample));
            } else if sample.selects(BusWindows::IO2) {
                out = Some(core.read_io_page(0, IO2_ROM_PAGE, sample));
            } else if sample.selects(BusWindows::IO1) {
                core.set_mode(MemoryMode::Mode8K);
                self.countdown = EPYX_CAPACITOR_CYCLES;
                out = Some(0);
            }
        }

        if self.countdown > 0 {
            self.countdown -= 1;
            if self.countdown == 0 {
                trace!("epyx capacitor drained");
                core.set_mode(MemoryMode::Off);
            }
        }
        out
    }

    fn vic_read(&self, _core: &CartCore, _sample: &BusCycleSample) -> Option<u8> {
        None
    }
}
