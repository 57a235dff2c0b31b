use log::debug;
use serde::{Deserialize, Serialize};

use crate::bus::{BusCycleSample, BusWindows};
use crate::cartridge::{CartCore, CartridgeI, MemoryMode};
use crate::consts::*;

const FC3_REGISTER: u8 = 0xff;
const FC3_BANK_BITS: u8 = 0x0f;
const FC3_EXROM: u8 = 0x10;
const FC3_GAME: u8 = 0x20;
const FC3_NMI: u8 = 0x40;
const FC3_HIDE: u8 = 0x80;

/// Final Cartridge III and III+, control register at $DFFF.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FinalCartridge3 {}

impl FinalCartridge3 {
    pub fn new() -> Self {
        Self {}
    }

    fn control_write(&mut self, core: &mut CartCore, d: u8) {
        let bank = core.wrap_bank((d & FC3_BANK_BITS) as usize);
        core.switch_bank(bank);
        core.regs_mut().set_control(d);
        core.set_mode(MemoryMode::from_lines(d & FC3_EXROM != 0, d & FC3_GAME != 0));
        core.set_nmi(d & FC3_NMI == 0);
        if d & FC3_HIDE != 0 {
            debug!("fc3 register hidden");
            core.regs_mut().set_enabled(false);
        }
    }
}

impl CartridgeI for FinalCartridge3 {
    fn reinit(&mut self, core: &mut CartCore) {
        core.set_mode(MemoryMode::Mode16K);
        core.set_nmi(false);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        if sample.cpu_reads() {
            if sample.selects(BusWindows::IO1) {
                return Some(core.read_io_page(core.regs().bank(), IO1_ROM_PAGE, sample));
            }
            if sample.selects(BusWindows::IO2) {
                return Some(core.read_io_page(core.regs().bank(), IO2_ROM_PAGE, sample));
            }
            return core.read_window(sample);
        }
        if sample.cpu_writes()
            && sample.selects(BusWindows::IO2)
            && sample.io_address() == FC3_REGISTER
            && core.regs().enabled()
        {
            self.control_write(core, sample.data());
        }
        None
    }

    // NMI stays low until the handler writes the register with bit 6 set.
    fn freeze(&mut self, core: &mut CartCore) {
        let exrom_high = core.mode().exrom_high();
        core.set_mode(MemoryMode::from_lines(exrom_high, false));
        core.set_nmi(true);
    }
}
