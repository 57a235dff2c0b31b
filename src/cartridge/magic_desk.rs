use log::trace;
use serde::{Deserialize, Serialize};

use super::{CartCore, CartridgeI, MemoryMode};
use crate::bus::{BusCycleSample, BusWindows};

/// MagicDesk and FunPlay style: one bank register at $DE00, bit 7 turns
/// the cartridge off.
#[derive(Debug, Serialize, Deserialize)]
pub struct MagicDesk {
    bank_mask: u8,
}

impl MagicDesk {
    pub fn new(banks: usize) -> Self {
        Self {
            bank_mask: if banks > 64 { 0x7f } else { 0x3f },
        }
    }
}

impl CartridgeI for MagicDesk {
    fn reinit(&mut self, core: &mut CartCore) {
        core.set_mode(MemoryMode::Mode8K);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        if sample.cpu_writes() && sample.selects(BusWindows::IO1) && sample.io_address() == 0 {
            let d = sample.data();
            if d & 0x80 == 0 {
                let bank = core.wrap_bank((d & self.bank_mask) as usize);
                core.switch_bank(bank);
                core.set_mode(MemoryMode::Mode8K);
            } else {
                trace!("magic desk off");
                core.set_mode(MemoryMode::Off);
            }
            return None;
        }
        if sample.cpu_reads() {
            return core.read_window(sample);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::BusWindows;
    use crate::cartridge::tests::TestCore;
    use crate::cartridge::MemoryMode;
    use test_log::test;

    macro_rules! T {
        ($b: expr) => {
            assert!($b);
        };
    }

    #[test]
    fn large_images_use_seven_bank_bits() {
        let mut c = TestCore::banked(19, 130);
        c.write(BusWindows::IO1, 0, 0x41);
        T!(c.bank() == 65);
        T!(c.read(BusWindows::ROML, 0) == Some(65));
    }

    #[test]
    fn small_images_wrap_at_the_bank_count() {
        let mut c = TestCore::banked(19, 16);
        c.write(BusWindows::IO1, 0, 0x41);
        T!(c.bank() == 0x01);
        c.write(BusWindows::IO1, 0, 0x13);
        T!(c.bank() == 3);
    }

    #[test]
    fn bit7_switches_off_and_a_bank_write_comes_back() {
        let mut c = TestCore::banked(7, 8);
        c.write(BusWindows::IO1, 0, 0x80);
        T!(c.mode() == MemoryMode::Off);
        c.write(BusWindows::IO1, 0, 0x02);
        T!(c.mode() == MemoryMode::Mode8K);
        T!(c.bank() == 2);
        c.write(BusWindows::IO1, 1, 0x05);
        T!(c.bank() == 2);
    }
}
