use log::debug;
use serde::{Deserialize, Serialize};

use super::{CartCore, CartridgeI, MemoryMode};
use crate::bus::{BusCycleSample, BusWindows};
use crate::memory::Window;

/// RGCD and Hucky: a 3-bit latch at $DE00, bit 3 disables until reset.
/// Hucky wires the latch inverted, so the bank register holds the latch and
/// the chip sees `latch ^ 7`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Rgcd {
    hucky: bool,
}

impl Rgcd {
    pub fn new(hucky: bool) -> Self {
        Self { hucky }
    }

    #[inline]
    fn physical_bank(&self, core: &CartCore) -> usize {
        let latch = core.regs().bank();
        core.wrap_bank(if self.hucky { latch ^ 7 } else { latch })
    }
}

impl CartridgeI for Rgcd {
    fn reinit(&mut self, core: &mut CartCore) {
        core.set_mode(MemoryMode::Mode8K);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        if sample.cpu_writes() && sample.selects(BusWindows::IO1) {
            let d = sample.data();
            if d & 8 != 0 {
                debug!("rgcd disabled until reset");
                core.regs_mut().set_enabled(false);
                core.set_mode(MemoryMode::Off);
            }
            core.switch_bank((d & 7) as usize);
            return None;
        }
        if sample.cpu_reads() && sample.selects(BusWindows::ROML) && core.regs().enabled() {
            let bank = self.physical_bank(core);
            return Some(core.store().read_cached(Window::RomL, bank, sample.cache_offset()));
        }
        None
    }

    fn vic_read(&self, _core: &CartCore, _sample: &BusCycleSample) -> Option<u8> {
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

    fn hucky(banks: u16) -> TestCore {
        use crate::cartridge::crt::tests::banked;
        use crate::cartridge::crt::CrtImage;
        let img = banked(57, banks);
        let mut h = img.header().clone();
        h.set_subtype(1);
        TestCore::new(&CrtImage::new(h, img.chips().to_vec()))
    }

    #[test]
    fn rgcd_latch_selects_the_bank() {
        let mut c = TestCore::banked(57, 8);
        T!(c.read(BusWindows::ROML, 0) == Some(0));
        c.write(BusWindows::IO1, 0, 0x05);
        T!(c.read(BusWindows::ROML, 0) == Some(5));
    }

    #[test]
    fn hucky_starts_in_the_last_bank() {
        let mut c = hucky(8);
        T!(c.bank() == 0);
        T!(c.read(BusWindows::ROML, 0) == Some(7));
        c.write(BusWindows::IO1, 0, 0x02);
        T!(c.read(BusWindows::ROML, 0) == Some(5));
    }

    #[test]
    fn bit3_disables_until_reset() {
        let mut c = TestCore::banked(57, 8);
        c.write(BusWindows::IO1, 0, 0x08);
        T!(c.mode() == MemoryMode::Off);
        T!(c.read(BusWindows::ROML, 0).is_none());
        c.cart.on_reset(false);
        T!(c.mode() == MemoryMode::Mode8K);
        T!(c.read(BusWindows::ROML, 0) == Some(0));
    }
}
