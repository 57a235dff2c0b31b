use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::bus::{BusCycleSample, BusWindows};
use crate::cartridge::{CartCore, CartridgeI, MemoryMode};
use crate::consts::*;

const AR_DISABLE: u8 = 0x04;
const AR_RAM: u8 = 0x20;
const AR_NMI_RELEASE: u8 = 0x40;
// RAM at $A000 with ROM at $8000, AtomicPower only.
const ATOMIC_RAM_ROMH_MASK: u8 = 0xe7;
const ATOMIC_RAM_ROMH: u8 = 0x22;

fn ar_mode(bits: u8) -> MemoryMode {
    match bits & 3 {
        0 => MemoryMode::Mode8K,
        1 => MemoryMode::Mode16K,
        2 => MemoryMode::Off,
        _ => MemoryMode::Ultimax,
    }
}

/// Action Replay 4.x/5/6 and AtomicPower: 32K ROM in four banks plus 8K RAM.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionReplay {
    atomic: bool,
    ram_at_romh: bool,
}

impl ActionReplay {
    pub fn new(atomic: bool) -> Self {
        Self {
            atomic,
            ram_at_romh: false,
        }
    }

    fn control_write(&mut self, core: &mut CartCore, d: u8) {
        core.regs_mut().set_control(d);
        core.switch_bank(((d >> 3) & 3) as usize);
        if d & AR_DISABLE != 0 {
            debug!("action replay disabled");
            core.regs_mut().set_enabled(false);
        }
        if d & AR_NMI_RELEASE != 0 {
            core.set_nmi(false);
        }

        if self.atomic && d & ATOMIC_RAM_ROMH_MASK == ATOMIC_RAM_ROMH {
            core.regs_mut().set_export_ram(false);
            self.ram_at_romh = true;
            core.set_mode(MemoryMode::Mode16K);
        } else {
            core.regs_mut().set_export_ram(d & AR_RAM != 0);
            self.ram_at_romh = false;
            core.set_mode(ar_mode(d));
        }
        trace!("ar control 0x{:02x}", d);
    }

    #[inline]
    fn ram_exported(&self, core: &CartCore) -> bool {
        core.regs().export_ram() || self.ram_at_romh
    }

    #[inline]
    fn ram_window(&self, core: &CartCore, sample: &BusCycleSample) -> bool {
        (sample.selects(BusWindows::ROML) && core.regs().export_ram()) || (sample.selects(BusWindows::ROMH) && self.ram_at_romh)
    }
}

impl CartridgeI for ActionReplay {
    fn reinit(&mut self, core: &mut CartCore) {
        core.regs_mut().set_enabled(true);
        self.control_write(core, 0);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        if !core.regs().enabled() {
            return None;
        }
        let offset = (sample.address() & WINDOW_MASK) as usize;
        let io2_offset = (IO2_ROM_PAGE | sample.io_address() as u16) as usize;

        if sample.cpu_reads() {
            if self.ram_window(core, sample) {
                return Some(core.store().ram().get(offset));
            }
            if sample.selects(BusWindows::ROML | BusWindows::ROMH) {
                return core.read_window(sample);
            }
            if sample.selects(BusWindows::IO1) {
                return Some(core.regs().control());
            }
            if sample.selects(BusWindows::IO2) {
                if self.ram_exported(core) {
                    return Some(core.store().ram().get(io2_offset));
                }
                return Some(core.read_io_page(core.regs().bank(), IO2_ROM_PAGE, sample));
            }
            return None;
        }

        if sample.cpu_writes() {
            if self.ram_window(core, sample) {
                core.store_mut().ram_mut().set(offset, sample.data());
            } else if sample.selects(BusWindows::IO1) {
                self.control_write(core, sample.data());
            } else if sample.selects(BusWindows::IO2) && self.ram_exported(core) {
                core.store_mut().ram_mut().set(io2_offset, sample.data());
            }
        }
        None
    }

    fn freeze(&mut self, core: &mut CartCore) {
        core.regs_mut().set_enabled(true);
        core.switch_bank(0);
        core.regs_mut().set_export_ram(self.atomic);
        self.ram_at_romh = false;
        core.set_mode(MemoryMode::Ultimax);
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
    fn control_register() {
        let mut c = TestCore::banked(1, 4);
        T!(c.mode() == MemoryMode::Mode8K);
        c.write(BusWindows::IO1, 0, 0x18 | 0x01);
        T!(c.bank() == 3);
        T!(c.mode() == MemoryMode::Mode16K);
        T!(c.read(BusWindows::IO1, 0x33) == Some(0x19));
        T!(c.read(BusWindows::ROML, 0) == Some(3));
        T!(c.read(BusWindows::ROMH, 1) == Some(0x83));
        c.write(BusWindows::IO1, 0, 0x02);
        T!(c.mode() == MemoryMode::Off);
    }

    #[test]
    fn exported_ram_shadows_roml_and_io2() {
        let mut c = TestCore::banked(1, 4);
        c.write(BusWindows::IO1, 0, 0x20);
        c.write(BusWindows::ROML, 0x0000, 0x5a);
        T!(c.read(BusWindows::ROML, 0x0000) == Some(0x5a));
        c.write(BusWindows::IO2, 0x44, 0xa5);
        T!(c.read(BusWindows::IO2, 0x44) == Some(0xa5));
        T!(c.read(BusWindows::ROML, 0x1f44) == Some(0xa5));
        c.write(BusWindows::IO1, 0, 0x00);
        T!(c.read(BusWindows::ROML, 0x0000) == Some(0));
        c.write(BusWindows::IO2, 0x44, 0x11);
        T!(c.read(BusWindows::IO2, 0x44) == Some(0));
    }

    #[test]
    fn disable_bit_hides_the_cartridge_until_freeze() {
        let mut c = TestCore::banked(1, 4);
        c.write(BusWindows::IO1, 0, 0x04 | 0x02);
        T!(c.read(BusWindows::IO1, 0).is_none());
        c.write(BusWindows::IO1, 0, 0x00);
        T!(c.mode() == MemoryMode::Off);
        c.freeze();
        T!(c.mode() == MemoryMode::Ultimax);
        T!(c.read(BusWindows::ROMH, 0) == Some(0));
        T!(!c.cart.core().regs().export_ram());
    }

    #[test]
    fn freeze_returns_to_bank_zero() {
        let mut c = TestCore::banked(1, 4);
        c.write(BusWindows::IO1, 0, 0x08);
        c.freeze();
        T!(c.bank() == 0);
        T!(!c.lines().nmi_asserted());
    }

    #[test]
    fn atomic_power_maps_ram_at_romh() {
        let mut c = TestCore::banked(9, 4);
        c.write(BusWindows::IO1, 0, 0x22);
        T!(c.mode() == MemoryMode::Mode16K);
        c.write(BusWindows::ROMH, 0x0010, 0x77);
        T!(c.read(BusWindows::ROMH, 0x0010) == Some(0x77));
        T!(c.read(BusWindows::ROML, 0x0010) == Some(0));
        T!(c.read(BusWindows::IO2, 0x10) == Some(0));

        c.freeze();
        T!(c.cart.core().regs().export_ram());
        T!(c.read(BusWindows::ROML, 0x0010) == Some(0x77));
    }
}
