use serde::{Deserialize, Serialize};

use super::eeprom::{M93c86, M93c86Pins};
use super::{CartCore, CartridgeI, MemoryMode};
use crate::bus::{BusCycleSample, BusWindows};

const GMOD2_EEPROM_CS: u8 = 0x40;
const GMOD2_EEPROM_CLK: u8 = 0x20;
const GMOD2_EEPROM_DI: u8 = 0x10;

#[derive(Debug, Serialize, Deserialize)]
pub struct Gmod2 {
    eeprom: M93c86,
}

impl Gmod2 {
    pub fn new() -> Self {
        Self { eeprom: M93c86::new() }
    }

    pub fn eeprom(&self) -> &M93c86 {
        &self.eeprom
    }

    pub fn eeprom_mut(&mut self) -> &mut M93c86 {
        &mut self.eeprom
    }
}

impl Default for Gmod2 {
    fn default() -> Self {
        Gmod2::new()
    }
}

impl CartridgeI for Gmod2 {
    fn reinit(&mut self, core: &mut CartCore) {
        core.set_mode(MemoryMode::Mode8K);
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        if sample.selects(BusWindows::IO1) {
            if sample.cpu_writes() {
                let d = sample.data();
                let bank = core.wrap_bank((d & 0x3f) as usize);
                core.switch_bank(bank);
                core.set_mode(if d & 0xc0 == 0xc0 {
                    MemoryMode::Ultimax
                } else if d & 0x40 == 0 {
                    MemoryMode::Mode8K
                } else {
                    MemoryMode::Off
                });

                let mut pins = M93c86Pins::empty();
                pins.set(M93c86Pins::CS, d & GMOD2_EEPROM_CS != 0);
                pins.set(M93c86Pins::CLK, d & GMOD2_EEPROM_CLK != 0);
                pins.set(M93c86Pins::DI, d & GMOD2_EEPROM_DI != 0);
                self.eeprom.tick(pins);
                return None;
            }
            if sample.cpu_reads() {
                return Some(if self.eeprom.selected() { (self.eeprom.output() as u8) << 7 } else { 0 });
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
    use super::*;
    use crate::cartridge::tests::TestCore;
    use crate::persistence::{MemoryPersistence, Persistence};
    use test_log::test;

    macro_rules! T {
        ($b: expr) => {
            assert!($b);
        };
    }

    // CS high, bank bits 0
    fn send_bit(c: &mut TestCore, bit: bool) {
        let di = if bit { GMOD2_EEPROM_DI } else { 0 };
        c.write(BusWindows::IO1, 0, GMOD2_EEPROM_CS | di);
        c.write(BusWindows::IO1, 0, GMOD2_EEPROM_CS | GMOD2_EEPROM_CLK | di);
    }

    fn send(c: &mut TestCore, value: u32, bits: u8) {
        for i in (0..bits).rev() {
            send_bit(c, value & (1 << i) != 0);
        }
    }

    fn command(c: &mut TestCore, op: u32, addr: u32) {
        c.write(BusWindows::IO1, 0, 0);
        send_bit(c, true);
        send(c, op, 2);
        send(c, addr, 10);
    }

    #[test]
    fn register_selects_bank_and_mapping() {
        let mut c = TestCore::banked(60, 64);
        c.write(BusWindows::IO1, 0, 0x05);
        T!(c.bank() == 5 && c.mode() == MemoryMode::Mode8K);
        c.write(BusWindows::IO1, 0, 0xc0);
        T!(c.mode() == MemoryMode::Ultimax);
        c.write(BusWindows::IO1, 0, 0x40);
        T!(c.mode() == MemoryMode::Off);
        T!(c.read(BusWindows::IO1, 0) == Some(0x80));
    }

    #[test]
    fn eeprom_write_then_read_through_io1() {
        let mut c = TestCore::banked(60, 4);
        command(&mut c, 0b00, 0b11 << 8);
        command(&mut c, 0b01, 0x21);
        send(&mut c, 0xbeef, 16);
        command(&mut c, 0b10, 0x21);
        T!(c.read(BusWindows::IO1, 0) == Some(0));
        let mut w = 0u16;
        for _ in 0..16 {
            send_bit(&mut c, false);
            let bit = c.read(BusWindows::IO1, 0).unwrap_or(0) >> 7;
            w = (w << 1) | bit as u16;
        }
        T!(w == 0xbeef);

        let p = MemoryPersistence::new();
        T!(c.cart.persist(&p).unwrap() == 1);
        let blob = p.load(&format!("{}.eeprom", c.cart.md5())).unwrap().unwrap();
        T!(blob[0x42] == 0xbe && blob[0x43] == 0xef);

        let mut again = TestCore::banked(60, 4);
        T!(again.cart.restore(&p).unwrap() == 1);
        T!(again.cart.persist(&p).unwrap() == 0);
    }
}
