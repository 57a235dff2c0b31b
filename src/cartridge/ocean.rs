use serde::{Deserialize, Serialize};

use super::{CartCore, CartridgeI, MemoryMode};
use crate::bus::{BusCycleSample, BusWindows};

#[derive(Debug, Serialize, Deserialize)]
pub struct Ocean {
    mode: MemoryMode,
}

impl Ocean {
    pub fn new(banks: usize) -> Self {
        Self {
            mode: if banks > 32 { MemoryMode::Mode8K } else { MemoryMode::Mode16K },
        }
    }
}

impl CartridgeI for Ocean {
    fn reinit(&mut self, core: &mut CartCore) {
        core.set_mode(self.mode);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        if sample.cpu_writes() && sample.selects(BusWindows::IO1) {
            let bank = core.wrap_bank((sample.data() & 0x3f) as usize);
            core.switch_bank(bank);
            return None;
        }
        if sample.cpu_reads() {
            // ROMH mirrors the ROML bank
            return core.read_window(sample);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::BusWindows;
    use crate::cartridge::tests::TestCore;
    use test_log::test;

    macro_rules! T {
        ($b: expr) => {
            assert!($b);
        };
    }

    #[test]
    fn romh_shows_the_selected_bank() {
        let mut c = TestCore::banked(5, 16);
        c.write(BusWindows::IO1, 0, 0xc9);
        T!(c.bank() == 9);
        T!(c.read(BusWindows::ROML, 0) == Some(9));
        T!(c.read(BusWindows::ROMH, 0) == Some(9));
        T!(c.read(BusWindows::ROMH, 1) == Some(0x89));
    }
}
