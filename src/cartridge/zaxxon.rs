use serde::{Deserialize, Serialize};

use super::{CartCore, CartridgeI, MemoryMode};
use crate::bus::{BusCycleSample, BusWindows};
use crate::memory::Window;

/// Super Zaxxon: a 4K ROML mirrored twice, and every ROML read picks the
/// ROMH bank with A12.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Zaxxon {}

impl Zaxxon {
    pub fn new() -> Self {
        Self {}
    }
}

impl CartridgeI for Zaxxon {
    fn reinit(&mut self, core: &mut CartCore) {
        core.set_mode(MemoryMode::Mode16K);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        if !sample.cpu_reads() {
            return None;
        }
        if sample.selects(BusWindows::ROML) {
            // A12 sits in bit 4 of the cache-order offset
            let d = core.store().read_cached(Window::RomL, 0, sample.cache_offset() & !0x10);
            let bank = core.wrap_bank(((sample.address() >> 12) & 1) as usize);
            core.switch_bank(bank);
            return Some(d);
        }
        if sample.selects(BusWindows::ROMH) {
            return Some(core.read_rom(Window::RomH, sample));
        }
        None
    }
}
