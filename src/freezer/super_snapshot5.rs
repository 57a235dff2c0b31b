use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::bus::{BusCycleSample, BusWindows};
use crate::cartridge::{CartCore, CartridgeI, MemoryMode};
use crate::consts::*;

const SS5_NMI_RELEASE: u8 = 0x01;
const SS5_RAM_OFF: u8 = 0x02;
const SS5_ROM_OFF: u8 = 0x08;

const SS5_MODES: [MemoryMode; 4] = [MemoryMode::Ultimax, MemoryMode::Off, MemoryMode::Mode16K, MemoryMode::Mode8K];

/// Super Snapshot V5: 64K ROM in four 16K banks and 32K RAM banked alongside.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SuperSnapshot5 {}

impl SuperSnapshot5 {
    pub fn new() -> Self {
        Self {}
    }

    fn control_write(&mut self, core: &mut CartCore, d: u8) {
        let bank = core.wrap_bank((((d >> 3) & 2) | ((d >> 2) & 1)) as usize);
        core.switch_bank(bank);
        core.regs_mut().set_control(d);
        core.regs_mut().set_export_ram(d & SS5_RAM_OFF == 0);
        if d & SS5_NMI_RELEASE != 0 {
            core.set_nmi(false);
        }
        if d & SS5_ROM_OFF != 0 {
            debug!("super snapshot disabled");
            core.regs_mut().set_enabled(false);
            core.set_mode(MemoryMode::Off);
        } else {
            core.set_mode(SS5_MODES[(d & 3) as usize]);
        }
        trace!("ss5 control 0x{:02x}", d);
    }

    #[inline]
    fn ram_offset(core: &CartCore, sample: &BusCycleSample) -> usize {
        core.regs().bank() * WINDOW_SIZE + (sample.address() & WINDOW_MASK) as usize
    }
}

impl CartridgeI for SuperSnapshot5 {
    fn reinit(&mut self, core: &mut CartCore) {
        core.regs_mut().set_export_ram(true);
        core.set_mode(MemoryMode::Ultimax);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        let active = core.regs().enabled();
        if sample.cpu_reads() {
            if sample.selects(BusWindows::ROML) {
                if core.regs().export_ram() {
                    return Some(core.store().ram().get(Self::ram_offset(core, sample)));
                }
                return if active { core.read_window(sample) } else { None };
            }
            if !active {
                return None;
            }
            if sample.selects(BusWindows::ROMH) {
                return core.read_window(sample);
            }
            if sample.selects(BusWindows::IO1) {
                return Some(core.read_io_page(core.regs().bank(), IO1_ROM_PAGE, sample));
            }
            return None;
        }

        if sample.cpu_writes() && active {
            if sample.selects(BusWindows::IO1) {
                self.control_write(core, sample.data());
            } else if sample.selects(BusWindows::ROML) && core.regs().export_ram() {
                let offset = Self::ram_offset(core, sample);
                core.store_mut().ram_mut().set(offset, sample.data());
            }
        }
        None
    }

    fn freeze(&mut self, core: &mut CartCore) {
        core.regs_mut().set_enabled(true);
        core.regs_mut().set_export_ram(true);
        core.switch_bank(0);
        core.set_mode(MemoryMode::Ultimax);
    }
}
