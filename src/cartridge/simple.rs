use log::trace;
use serde::{Deserialize, Serialize};

use super::{CartCore, CartridgeI, MemoryMode};
use crate::bus::{BusCycleSample, BusWindows};
use crate::consts::*;

#[inline]
fn io1_write(s: &BusCycleSample) -> bool {
    s.cpu_writes() && s.selects(BusWindows::IO1)
}

#[inline]
fn io2_write(s: &BusCycleSample) -> bool {
    s.cpu_writes() && s.selects(BusWindows::IO2)
}

#[inline]
fn io1_read(s: &BusCycleSample) -> bool {
    s.cpu_reads() && s.selects(BusWindows::IO1)
}

#[inline]
fn io2_read(s: &BusCycleSample) -> bool {
    s.cpu_reads() && s.selects(BusWindows::IO2)
}

#[inline]
fn rom_read(core: &CartCore, s: &BusCycleSample) -> Option<u8> {
    if s.cpu_reads() {
        core.read_window(s)
    } else {
        None
    }
}

/// Plain 8K/16K/Ultimax ROM, mapping fixed by the image header.
#[derive(Debug, Serialize, Deserialize)]
pub struct Normal {
    mode: MemoryMode,
}

impl Normal {
    pub fn new(mode: MemoryMode) -> Self {
        Self { mode }
    }
}

impl CartridgeI for Normal {
    fn reinit(&mut self, core: &mut CartCore) {
        core.set_mode(self.mode);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        rom_read(core, sample)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct C64gs {}

impl C64gs {
    pub fn new() -> Self {
        Self {}
    }
}

impl CartridgeI for C64gs {
    fn reinit(&mut self, core: &mut CartCore) {
        core.set_mode(MemoryMode::Mode8K);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        if io1_write(sample) {
            let bank = core.wrap_bank((sample.io_address() & C64GS_BANK_MASK) as usize);
            core.switch_bank(bank);
        } else if io1_read(sample) {
            core.switch_bank(0);
        }
        rom_read(core, sample)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Dinamic {}

impl Dinamic {
    pub fn new() -> Self {
        Self {}
    }
}

impl CartridgeI for Dinamic {
    fn reinit(&mut self, core: &mut CartCore) {
        core.set_mode(MemoryMode::Mode8K);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        if io1_read(sample) && sample.io_address() < 16 {
            let bank = core.wrap_bank(sample.io_address() as usize);
            core.switch_bank(bank);
            return None;
        }
        rom_read(core, sample)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Comal80 {}

impl Comal80 {
    pub fn new() -> Self {
        Self {}
    }
}

impl CartridgeI for Comal80 {
    fn reinit(&mut self, core: &mut CartCore) {
        core.set_mode(MemoryMode::Mode16K);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        if io1_write(sample) {
            let d = sample.data();
            core.regs_mut().set_control(d & 0xc7);
            let bank = core.wrap_bank((d & 3) as usize);
            core.switch_bank(bank);
            core.set_mode(if d & 0x40 != 0 { MemoryMode::Off } else { MemoryMode::Mode16K });
            trace!("comal80 control 0x{:02x}", d);
            return None;
        }
        if io1_read(sample) {
            return Some(core.regs().control());
        }
        rom_read(core, sample)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Prophet64 {}

impl Prophet64 {
    pub fn new() -> Self {
        Self {}
    }
}

impl CartridgeI for Prophet64 {
    fn reinit(&mut self, core: &mut CartCore) {
        core.set_mode(MemoryMode::Mode8K);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        if io2_write(sample) && sample.io_address() == 0 {
            let d = sample.data();
            let bank = core.wrap_bank((d & 0x1f) as usize);
            core.switch_bank(bank);
            core.set_mode(if d & 0x20 != 0 { MemoryMode::Off } else { MemoryMode::Mode8K });
            return None;
        }
        rom_read(core, sample)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SimonsBasic {}

impl SimonsBasic {
    pub fn new() -> Self {
        Self {}
    }
}

impl CartridgeI for SimonsBasic {
    fn reinit(&mut self, core: &mut CartCore) {
        core.set_mode(MemoryMode::Mode16K);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        if io1_read(sample) {
            core.set_mode(MemoryMode::Mode8K);
            return None;
        }
        if io1_write(sample) {
            core.set_mode(MemoryMode::Mode16K);
            return None;
        }
        rom_read(core, sample)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WarpSpeed {}

impl WarpSpeed {
    pub fn new() -> Self {
        Self {}
    }
}

impl CartridgeI for WarpSpeed {
    fn reinit(&mut self, core: &mut CartCore) {
        core.set_mode(MemoryMode::Mode16K);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        if io1_read(sample) {
            return Some(core.read_io_page(0, IO1_ROM_PAGE, sample));
        }
        if io2_read(sample) {
            return Some(core.read_io_page(0, IO2_ROM_PAGE, sample));
        }
        if io1_write(sample) {
            core.set_mode(MemoryMode::Mode16K);
        } else if io2_write(sample) {
            core.set_mode(MemoryMode::Off);
        }
        rom_read(core, sample)
    }
}
