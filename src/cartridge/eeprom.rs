use bitflags::bitflags;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::consts::*;

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug)]
pub enum M93c86State {
    WaitForStartBit,
    WaitForCommand,
    SendingData,
    WaitForWrite,
    WaitForWriteAll,
}

const M93C86_CMD_ERASE: u16 = 0b11;
const M93C86_CMD_READ: u16 = 0b10;
const M93C86_CMD_WRITE: u16 = 0b01;

const M93C86_ADR_WRAL: u16 = 0b01;
const M93C86_ADR_ERAL: u16 = 0b10;
const M93C86_ADR_EWDS: u16 = 0b00;
const M93C86_ADR_EWEN: u16 = 0b11;

// 16-bit organisation
const ADDRESS_BITS: u8 = 10;
const DATA_LEN: u8 = 16;
const COMMAND_LEN: u8 = ADDRESS_BITS + 2;
const ADDRESS_MASK: u16 = (1 << ADDRESS_BITS) - 1;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct M93c86Pins: u8 {
        const DO = 0b00001000;
        const DI = 0b00000100;
        const CLK = 0b00000010;
        const CS = 0b00000001;
    }
}

/// Microwire serial EEPROM, 1024 x 16 bits.
#[derive(Clone, Serialize, Deserialize)]
pub struct M93c86 {
    data: Vec<u16>,
    state: M93c86State,
    prev_clk: bool,
    shifter: u16,
    shifter_in: u8,
    data_buffer: u16,
    data_buffer_in: u8,
    ewds: bool,
    last_output: bool,
    selected: bool,
    modified: bool,
}

impl M93c86 {
    pub fn new() -> Self {
        Self {
            data: vec![0xFFFF; GMOD2_EEPROM_WORDS],
            state: M93c86State::WaitForStartBit,
            prev_clk: false,
            shifter: 0,
            shifter_in: 0,
            data_buffer: 0,
            data_buffer_in: 0,
            ewds: true,
            last_output: true,
            selected: false,
            modified: false,
        }
    }

    pub fn tick(&mut self, p: M93c86Pins) {
        self.selected = p.contains(M93c86Pins::CS);
        if self.selected {
            if !self.prev_clk && p.contains(M93c86Pins::CLK) {
                self.clock(p);
            }
        } else {
            self.reset();
        }

        self.prev_clk = p.contains(M93c86Pins::CLK);
    }

    fn clock(&mut self, p: M93c86Pins) {
        let di = p.contains(M93c86Pins::DI) as u16;
        match self.state {
            M93c86State::WaitForStartBit => {
                if di != 0 {
                    self.state = M93c86State::WaitForCommand;
                }
            }
            M93c86State::WaitForCommand => {
                self.shifter = (self.shifter << 1) | di;
                self.shifter_in += 1;
                if self.shifter_in == COMMAND_LEN {
                    trace!("clock cmd:{:02b} {:016b}", (self.shifter >> ADDRESS_BITS) & 0b11, self.shifter);
                    match (self.shifter >> ADDRESS_BITS) & 0b11 {
                        0 => match (self.shifter >> (ADDRESS_BITS - 2)) & 0b11 {
                            M93C86_ADR_ERAL => self.eral(),
                            M93C86_ADR_EWDS => self.ewds(),
                            M93C86_ADR_EWEN => self.ewen(),
                            M93C86_ADR_WRAL => self.state = M93c86State::WaitForWriteAll,
                            _ => self.reset(),
                        },
                        M93C86_CMD_ERASE => self.erase(),
                        M93C86_CMD_READ => self.read(),
                        M93C86_CMD_WRITE => self.state = M93c86State::WaitForWrite,
                        _ => self.reset(),
                    }
                }
            }
            M93c86State::SendingData => {
                self.last_output = self.data_buffer & (1 << self.data_buffer_in) != 0;
                if self.data_buffer_in == 0 {
                    self.reset();
                } else {
                    self.data_buffer_in -= 1;
                }
            }
            M93c86State::WaitForWrite | M93c86State::WaitForWriteAll => {
                self.data_buffer = (self.data_buffer << 1) | di;
                self.data_buffer_in += 1;
                if self.data_buffer_in == DATA_LEN {
                    if self.state == M93c86State::WaitForWrite {
                        self.write();
                    } else {
                        self.wral();
                    }
                }
            }
        }
    }

    fn address(&self) -> usize {
        (self.shifter & ADDRESS_MASK) as usize
    }

    fn write(&mut self) {
        if !self.ewds {
            let addr = self.address();
            self.data[addr] = self.data_buffer;
            self.modified = true;
            trace!("write 0x{:04X} with 0x{:04X}", addr, self.data_buffer);
        } else {
            trace!("write disabled");
        }

        self.last_output = true;
        self.reset();
    }

    fn wral(&mut self) {
        if !self.ewds {
            self.data.fill(self.data_buffer);
            self.modified = true;
            trace!("wral with 0x{:04X}", self.data_buffer);
        } else {
            trace!("wral disabled");
        }
        self.last_output = true;
        self.reset();
    }

    fn reset(&mut self) {
        self.shifter = 0;
        self.shifter_in = 0;
        self.data_buffer = 0;
        self.data_buffer_in = 0;
        self.state = M93c86State::WaitForStartBit;
    }

    fn erase(&mut self) {
        if !self.ewds {
            let addr = self.address();
            self.data[addr] = 0xFFFF;
            self.modified = true;
            trace!("erase 0x{:04X}", addr);
        } else {
            trace!("erase disabled");
        }
        self.last_output = true;
        self.reset();
    }

    fn eral(&mut self) {
        if !self.ewds {
            self.data.fill(0xFFFF);
            self.modified = true;
            trace!("eral");
        } else {
            trace!("eral disabled");
        }
        self.last_output = true;
        self.reset();
    }

    fn ewds(&mut self) {
        self.ewds = true;
        trace!("ewds");
        self.reset();
    }

    fn ewen(&mut self) {
        self.ewds = false;
        trace!("ewen");
        self.reset();
    }

    fn read(&mut self) {
        let addr = self.address();
        self.data_buffer = self.data[addr];
        self.data_buffer_in = DATA_LEN - 1;
        // dummy zero before D15
        self.last_output = false;
        trace!("read 0x{:04X}: 0x{:04X}", addr, self.data_buffer);
        self.state = M93c86State::SendingData;
    }

    /// Level of the DO pin.
    #[inline]
    #[must_use]
    pub fn output(&self) -> bool {
        self.last_output
    }

    #[inline]
    #[must_use]
    pub fn selected(&self) -> bool {
        self.selected
    }

    #[must_use]
    pub fn state(&self) -> M93c86State {
        self.state
    }

    #[must_use]
    pub fn word(&self, addr: usize) -> u16 {
        self.data[addr & ADDRESS_MASK as usize]
    }

    #[must_use]
    pub fn modified(&self) -> bool {
        self.modified
    }

    pub fn clear_modified(&mut self) {
        self.modified = false;
    }

    /// Contents as stored on disk, big-endian words.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    pub fn load_bytes(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() != GMOD2_EEPROM_BYTES {
            return false;
        }
        for (w, b) in self.data.iter_mut().zip(bytes.chunks_exact(2)) {
            *w = u16::from_be_bytes([b[0], b[1]]);
        }
        true
    }
}

impl Default for M93c86 {
    fn default() -> Self {
        M93c86::new()
    }
}

impl core::fmt::Debug for M93c86 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "M93c86 {{ state:{:?} ewds:{} do:{} modified:{} }}", self.state, self.ewds, self.last_output, self.modified)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use test_log::test;

    macro_rules! T {
        ($b: expr) => {
            assert!($b);
        };
    }

    pub fn send_bit(ee: &mut M93c86, bit: bool) {
        let di = if bit { M93c86Pins::DI } else { M93c86Pins::empty() };
        ee.tick(M93c86Pins::CS | di);
        ee.tick(M93c86Pins::CS | M93c86Pins::CLK | di);
    }

    pub fn send(ee: &mut M93c86, value: u32, bits: u8) {
        for i in (0..bits).rev() {
            send_bit(ee, value & (1 << i) != 0);
        }
    }

    fn command(ee: &mut M93c86, op: u32, addr: u32) {
        ee.tick(M93c86Pins::empty());
        send_bit(ee, true);
        send(ee, op, 2);
        send(ee, addr, ADDRESS_BITS);
    }

    fn read_word(ee: &mut M93c86, addr: u32) -> u16 {
        command(ee, 0b10, addr);
        T!(!ee.output());
        let mut w = 0u16;
        for _ in 0..DATA_LEN {
            send_bit(ee, false);
            w = (w << 1) | ee.output() as u16;
        }
        w
    }

    #[test]
    fn writes_are_refused_until_enabled() {
        let mut ee = M93c86::new();
        command(&mut ee, 0b01, 0x12);
        send(&mut ee, 0x1234, 16);
        T!(ee.word(0x12) == 0xffff);
        T!(!ee.modified());

        command(&mut ee, 0b00, 0b11 << (ADDRESS_BITS - 2));
        command(&mut ee, 0b01, 0x12);
        send(&mut ee, 0x1234, 16);
        T!(ee.word(0x12) == 0x1234);
        T!(ee.modified());
        T!(read_word(&mut ee, 0x12) == 0x1234);
    }

    #[test]
    fn erase_all_and_write_all() {
        let mut ee = M93c86::new();
        command(&mut ee, 0b00, 0b11 << (ADDRESS_BITS - 2));
        command(&mut ee, 0b00, 0b01 << (ADDRESS_BITS - 2));
        send(&mut ee, 0xa55a, 16);
        T!(ee.word(0) == 0xa55a && ee.word(1023) == 0xa55a);
        command(&mut ee, 0b11, 7);
        T!(ee.word(7) == 0xffff);
        command(&mut ee, 0b00, 0b10 << (ADDRESS_BITS - 2));
        T!(ee.word(0) == 0xffff);
    }

    #[test]
    fn deselect_aborts_a_command() {
        let mut ee = M93c86::new();
        send_bit(&mut ee, true);
        send(&mut ee, 0b10, 2);
        T!(ee.state() == M93c86State::WaitForCommand);
        ee.tick(M93c86Pins::empty());
        T!(ee.state() == M93c86State::WaitForStartBit);
    }

    #[test]
    fn bytes_are_big_endian() {
        let mut ee = M93c86::new();
        let mut raw = vec![0u8; GMOD2_EEPROM_BYTES];
        raw[0] = 0x12;
        raw[1] = 0x34;
        T!(ee.load_bytes(&raw));
        T!(ee.word(0) == 0x1234);
        T!(ee.to_bytes() == raw);
        T!(!ee.load_bytes(&raw[1..]));
    }
}
