use log::{debug, trace};
use serde::{Deserialize, Serialize};

use super::{CartCore, CartridgeI, MemoryMode};
use crate::bus::{BusCycleSample, BusWindows};
use crate::consts::*;
use crate::memory::Window;

// Mapping per (jumper, MXG bits of $DE02): bit 1 EXROM high, bit 0 GAME low.
const MEMCONFIG: [u8; 16] = [3, 3, 1, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3, 0, 1];

fn memconfig(jumper: bool, control: u8) -> MemoryMode {
    let m = MEMCONFIG[((jumper as usize) << 3) | (control & 7) as usize];
    MemoryMode::from_lines(m & 2 != 0, m & 1 == 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum EapiState {
    Idle,
    Collect { cmd: u8, got: usize, args: [u8; 3] },
}

/// Flash commands sent byte-wise through the EF3 USB data register.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EapiChannel {
    state: EapiState,
    // one reply byte, taken by the next data register read
    reply: Option<u8>,
}

impl EapiChannel {
    fn new() -> Self {
        Self {
            state: EapiState::Idle,
            reply: None,
        }
    }

    fn write(&mut self, core: &mut CartCore, v: u8) {
        match self.state {
            EapiState::Idle => match v {
                EAPI_CMD_INIT => {
                    trace!("eapi init");
                    self.reply = Some(EAPI_REPLY_OK);
                }
                EAPI_CMD_WRITE_FLASH | EAPI_CMD_ERASE_SECTOR => {
                    self.state = EapiState::Collect { cmd: v, got: 0, args: [0; 3] };
                }
                _ => trace!("eapi: unknown command 0x{:02x}", v),
            },
            EapiState::Collect { cmd, mut got, mut args } => {
                args[got] = v;
                got += 1;
                if got < args.len() {
                    self.state = EapiState::Collect { cmd, got, args };
                    return;
                }
                self.state = EapiState::Idle;
                let addr = u16::from_le_bytes([args[0], args[1]]);
                let window = Window::from_a13(addr);
                if cmd == EAPI_CMD_WRITE_FLASH {
                    let bank = core.regs().bank();
                    core.store_mut().program(window, bank, addr & WINDOW_MASK, args[2]);
                    core.set_flash_modified(true);
                    self.reply = Some(EAPI_REPLY_OK);
                } else {
                    let bank = args[2];
                    if (bank as usize) < EASYFLASH_BANKS && bank % EASYFLASH_SECTOR_BANKS == 0 {
                        core.store_mut().erase_sector(window, bank as usize, EASYFLASH_SECTOR_BANKS as usize);
                        core.set_flash_modified(true);
                        self.reply = Some(EAPI_REPLY_OK);
                    } else {
                        debug!("eapi: cannot erase bank {}", bank);
                        self.reply = Some(EAPI_REPLY_WRITE_ERROR);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EasyFlash {
    jumper: bool,
    eapi: EapiChannel,
}

impl EasyFlash {
    pub fn new(jumper: bool) -> Self {
        Self {
            jumper,
            eapi: EapiChannel::new(),
        }
    }
}

impl CartridgeI for EasyFlash {
    fn reinit(&mut self, core: &mut CartCore) {
        self.eapi = EapiChannel::new();
        core.set_mode(memconfig(self.jumper, 0));
    }

    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        if sample.selects(BusWindows::IO1) {
            let io = sample.io_address();
            if sample.cpu_writes() {
                let d = sample.data();
                match io {
                    EF3_USB_DATA => {
                        self.eapi.write(core, d);
                        core.dma_mut().hold(0);
                    }
                    EF3_USB_CONTROL => (),
                    _ if io & 2 == 0 => core.switch_bank((d & EASYFLASH_BANK_MASK) as usize),
                    _ => {
                        core.regs_mut().set_control(d & EASYFLASH_CONTROL_MASK);
                        core.set_mode(memconfig(self.jumper, d));
                    }
                }
                return None;
            }
            if sample.cpu_reads() {
                return Some(match io {
                    EF3_USB_CONTROL => EF3_USB_READY,
                    EF3_USB_DATA => self.eapi.reply.take().unwrap_or(0),
                    _ if io & 2 == 0 => core.regs().bank() as u8,
                    _ => core.regs().control(),
                });
            }
            return None;
        }

        if sample.selects(BusWindows::IO2) {
            let io = sample.io_address() as usize;
            if sample.cpu_writes() {
                core.store_mut().ram_mut().set(io, sample.data());
                return None;
            }
            if sample.cpu_reads() {
                return Some(core.store().ram().get(io));
            }
            return None;
        }

        if sample.cpu_reads() {
            return core.read_window(sample);
        }
        None
    }

    fn on_reset(&mut self, core: &mut CartCore, button_held: bool) {
        if button_held {
            debug!("easyflash ram cleared");
            core.store_mut().ram_mut().fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::crt::tests::image;
    use crate::cartridge::tests::TestCore;
    use test_log::test;

    macro_rules! T {
        ($b: expr) => {
            assert!($b);
        };
    }

    fn ef(banks: u16) -> TestCore {
        let chips = (0..banks)
            .flat_map(|b| {
                [
                    (b, ROML_ADDR, vec![b as u8; WINDOW_SIZE]),
                    (b, ROMH_ULTIMAX_ADDR, vec![0x40 | b as u8; WINDOW_SIZE]),
                ]
            })
            .collect();
        TestCore::new(&image(32, 1, 0, chips))
    }

    fn eapi(c: &mut TestCore, bytes: &[u8]) {
        for b in bytes {
            c.write(BusWindows::IO1, EF3_USB_DATA as u16, *b);
        }
    }

    #[test]
    fn boots_in_ultimax_and_follows_the_control_register() {
        let mut c = ef(2);
        T!(c.mode() == MemoryMode::Ultimax);
        c.write(BusWindows::IO1, 0x02, 0x87);
        T!(c.mode() == MemoryMode::Mode16K);
        c.write(BusWindows::IO1, 0x02, 0x06);
        T!(c.mode() == MemoryMode::Mode8K);
        c.write(BusWindows::IO1, 0x02, 0x04);
        T!(c.mode() == MemoryMode::Off);
        T!(c.read(BusWindows::IO1, 0x02) == Some(0x04));
    }

    #[test]
    fn bank_register_selects_roml_and_romh() {
        let mut c = ef(2);
        c.write(BusWindows::IO1, 0x00, 1);
        T!(c.bank() == 1);
        T!(c.read(BusWindows::ROML, 0) == Some(1));
        T!(c.read(BusWindows::ROMH, 0x1fff) == Some(0x41));
        T!(c.read(BusWindows::IO1, 0x00) == Some(1));
    }

    #[test]
    fn io2_is_ram_and_reset_with_button_clears_it() {
        let mut c = ef(1);
        c.write(BusWindows::IO2, 0x80, 0x5a);
        T!(c.read(BusWindows::IO2, 0x80) == Some(0x5a));
        c.cart.on_reset(false);
        T!(c.read(BusWindows::IO2, 0x80) == Some(0x5a));
        c.cart.on_reset(true);
        T!(c.read(BusWindows::IO2, 0x80) == Some(0));
    }

    #[test]
    fn usb_registers() {
        let mut c = ef(1);
        T!(c.read(BusWindows::IO1, EF3_USB_CONTROL as u16) == Some(EF3_USB_READY));
        eapi(&mut c, &[EAPI_CMD_INIT]);
        T!(c.read(BusWindows::IO1, EF3_USB_DATA as u16) == Some(EAPI_REPLY_OK));
        T!(c.bank() == 0);
    }

    #[test]
    fn program_ands_into_the_active_bank() {
        let mut c = ef(2);
        c.write(BusWindows::IO1, 0x00, 1);
        eapi(&mut c, &[EAPI_CMD_WRITE_FLASH, 0x10, 0xa0, 0x0f]);
        T!(c.read(BusWindows::ROMH, 0x0010) == Some(0x41 & 0x0f));
        T!(c.read(BusWindows::ROML, 0x0010) == Some(1));
        eapi(&mut c, &[EAPI_CMD_WRITE_FLASH, 0x10, 0x80, 0x00]);
        T!(c.read(BusWindows::ROML, 0x0010) == Some(0));
        T!(c.cart.core().flash_modified());
        T!(c.cart.core().dma().line_asserted() || c.cart.core().dma().pending());
    }

    #[test]
    fn erase_fills_a_sector_with_ones() {
        let mut c = ef(2);
        eapi(&mut c, &[EAPI_CMD_ERASE_SECTOR, 0x00, 0x80, 0]);
        T!(c.read(BusWindows::IO1, EF3_USB_DATA as u16) == Some(EAPI_REPLY_OK));
        for bank in 0..2u8 {
            c.write(BusWindows::IO1, 0x00, bank);
            T!(c.read(BusWindows::ROML, 0x1234) == Some(0xff));
            T!(c.read(BusWindows::ROMH, 0x1234) == Some(0x40 | bank));
        }
        eapi(&mut c, &[EAPI_CMD_ERASE_SECTOR, 0x00, 0x80, 3]);
        T!(c.read(BusWindows::IO1, EF3_USB_DATA as u16) == Some(EAPI_REPLY_WRITE_ERROR));
    }

    #[test]
    fn reply_byte_is_read_once() {
        let mut c = ef(2);
        eapi(&mut c, &[EAPI_CMD_ERASE_SECTOR, 0x00, 0x80, 3]);
        T!(c.read(BusWindows::IO1, EF3_USB_DATA as u16) == Some(EAPI_REPLY_WRITE_ERROR));
        T!(c.read(BusWindows::IO1, EF3_USB_DATA as u16) == Some(0));
        eapi(&mut c, &[EAPI_CMD_INIT]);
        T!(c.read(BusWindows::IO1, EF3_USB_DATA as u16) == Some(EAPI_REPLY_OK));
    }
}
