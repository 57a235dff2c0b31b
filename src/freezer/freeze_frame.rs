use log::debug;
use serde::{Deserialize, Serialize};

use crate::bus::{BusCycleSample, BusWindows};
use crate::cartridge::{CartCore, CartridgeI, MemoryMode};
use crate::memory::Window;

/// Freeze Frame and Freeze Machine. Both answer ROML and ROMH from the same
/// 8K half; the Freeze Machine has two 16K ROMs and boots the other one on
/// every reset.
#[derive(Debug, Serialize, Deserialize)]
pub struct FreezeFrame {
    machine: bool,
    rom: usize,
    upper_half: bool,
}

impl FreezeFrame {
    pub fn new(machine: bool) -> Self {
        Self {
            machine,
            // the first reinit flips this to 0
            rom: 1,
            upper_half: false,
        }
    }

    #[inline]
    fn window(&self) -> Window {
        if self.upper_half {
            Window::RomH
        } else {
            Window::RomL
        }
    }

    #[inline]
    fn read_rom(&self, core: &CartCore, sample: &BusCycleSample) -> u8 {
        core.store().read_cached(self.window(), self.rom, sample.cache_offset())
    }
}

impl CartridgeI for FreezeFrame {
    fn reinit(&mut self, core: &mut CartCore) {
        if self.machine {
            self.rom = core.wrap_bank(1 - self.rom);
            debug!("freeze machine rom {}", self.rom);
        } else {
            self.rom = 0;
        }
        self.upper_half = false;
        core.set_mode(MemoryMode::Mode8K);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        if !sample.cpu_reads() {
            return None;
        }
        if sample.selects(BusWindows::ROML | BusWindows::ROMH) {
            return Some(self.read_rom(core, sample));
        }
        if !core.regs().enabled() {
            return None;
        }
        if sample.selects(BusWindows::IO1) {
            if !self.machine || core.mode() == MemoryMode::Ultimax {
                core.set_mode(MemoryMode::Mode8K);
            } else {
                core.set_mode(MemoryMode::Mode16K);
            }
        } else if sample.selects(BusWindows::IO2) {
            core.set_mode(MemoryMode::Off);
            if self.machine {
                self.upper_half = true;
            }
            core.regs_mut().set_enabled(false);
        }
        None
    }

    fn vic_read(&self, core: &CartCore, sample: &BusCycleSample) -> Option<u8> {
        if sample.selects(BusWindows::ROMH) {
            Some(self.read_rom(core, sample))
        } else {
            None
        }
    }

    fn freeze(&mut self, core: &mut CartCore) {
        core.regs_mut().set_enabled(true);
        core.set_mode(MemoryMode::Ultimax);
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::{BusCycleSample, BusWindows};
    use crate::cartridge::crt::tests::image;
    use crate::cartridge::tests::TestCore;
    use crate::cartridge::MemoryMode;
    use crate::consts::*;
    use test_log::test;

    macro_rules! T {
        ($b: expr) => {
            assert!($b);
        };
    }

    fn freeze_machine() -> TestCore {
        let chips = (0..2u16)
            .map(|b| {
                let mut d = vec![(b as u8) << 4; WINDOW_SIZE * 2];
                d[WINDOW_SIZE..].fill(((b as u8) << 4) | 1);
                (b, ROML_ADDR, d)
            })
            .collect();
        TestCore::new(&image(46, 0, 1, chips))
    }

    #[test]
    fn freeze_frame_io_switches_mapping() {
        let mut c = TestCore::banked(45, 1);
        T!(c.mode() == MemoryMode::Mode8K);
        c.freeze();
        T!(c.mode() == MemoryMode::Ultimax);
        T!(c.read(BusWindows::IO1, 0).is_none());
        T!(c.mode() == MemoryMode::Mode8K);
        T!(c.read(BusWindows::ROMH, 1) == Some(0x80));
        c.read(BusWindows::IO2, 0);
        T!(c.mode() == MemoryMode::Off);
        c.read(BusWindows::IO1, 0);
        T!(c.mode() == MemoryMode::Off);
    }

    #[test]
    fn freeze_machine_upper_half_after_io2() {
        let mut c = freeze_machine();
        T!(c.read(BusWindows::ROML, 0) == Some(0x00));
        T!(c.read(BusWindows::ROMH, 0) == Some(0x00));
        c.read(BusWindows::IO1, 0);
        T!(c.mode() == MemoryMode::Mode16K);
        c.read(BusWindows::IO2, 0);
        T!(c.mode() == MemoryMode::Off);
        T!(c.read(BusWindows::ROML, 0) == Some(0x01));
        let vic = BusCycleSample::cpu_read(BusWindows::ROMH | BusWindows::VIC, 0);
        T!(c.cart.vic_read(&vic) == Some(0x01));
    }

    #[test]
    fn freeze_machine_alternates_roms_on_reset() {
        let mut c = freeze_machine();
        c.cart.on_reset(false);
        T!(c.bank() == 0);
        T!(c.read(BusWindows::ROML, 0) == Some(0x10));
        c.cart.on_reset(false);
        T!(c.read(BusWindows::ROML, 0) == Some(0x00));
    }

    #[test]
    fn freeze_machine_freeze_from_16k() {
        let mut c = freeze_machine();
        c.read(BusWindows::IO1, 0);
        c.freeze();
        T!(c.mode() == MemoryMode::Ultimax);
        c.read(BusWindows::IO1, 0);
        T!(c.mode() == MemoryMode::Mode8K);
        c.read(BusWindows::IO1, 0);
        T!(c.mode() == MemoryMode::Mode16K);
    }
}
