// Expansion port windows, as decoded by the PLA of the guest.
pub const ROML_ADDR: u16 = 0x8000;
pub const ROMH_ADDR: u16 = 0xA000;
pub const ROMH_ULTIMAX_ADDR: u16 = 0xE000;
pub const IO1_ADDR: u16 = 0xDE00;
pub const IO2_ADDR: u16 = 0xDF00;

pub const WINDOW_SIZE: usize = 0x2000;
pub const WINDOW_MASK: u16 = 0x1FFF;
pub const HALF_WINDOW: usize = 0x1000;
pub const IO_PAGE_SIZE: usize = 0x100;
// Largest image the host pool holds.
pub const MAX_IMAGE_SIZE: usize = 0x10_0000;

// ROM pages mirrored into the I/O windows by several freezers.
pub const IO1_ROM_PAGE: u16 = 0x1E00;
pub const IO2_ROM_PAGE: u16 = 0x1F00;

/*
Phase 1 of a cycle: the multiplexer presents the low address byte and the
control inputs. All control inputs are active low except R/W (high = read)
and PHI2 (low = video half-cycle).
*/
pub const BUS_PIN_A0: u32 = 1;
pub const BUS_PIN_A1: u32 = 2;
pub const BUS_PIN_A2: u32 = 3;
pub const BUS_PIN_A3: u32 = 4;
pub const BUS_PIN_A4: u32 = 5;
pub const BUS_PIN_A5: u32 = 6;
pub const BUS_PIN_A6: u32 = 7;
pub const BUS_PIN_A7: u32 = 8;
pub const BUS_PIN_RW: u32 = 9;
pub const BUS_PIN_RESET: u32 = 10;
pub const BUS_PIN_PHI2: u32 = 11;
pub const BUS_PIN_BUTTON: u32 = 12;

/*
Phase 2: after the multiplexer is switched the same lines carry A8..A12, the
four window selects (active low) and BA (high = bus available to the CPU).
*/
pub const BUS_PIN_A8: u32 = 1;
pub const BUS_PIN_A9: u32 = 2;
pub const BUS_PIN_A10: u32 = 3;
pub const BUS_PIN_A11: u32 = 4;
pub const BUS_PIN_A12: u32 = 5;
pub const BUS_PIN_ROML: u32 = 6;
pub const BUS_PIN_ROMH: u32 = 7;
pub const BUS_PIN_IO1: u32 = 8;
pub const BUS_PIN_IO2: u32 = 9;
pub const BUS_PIN_BA: u32 = 10;

pub const ADDR_LO_PINS: [u32; 8] = [BUS_PIN_A0, BUS_PIN_A1, BUS_PIN_A2, BUS_PIN_A3, BUS_PIN_A4, BUS_PIN_A5, BUS_PIN_A6, BUS_PIN_A7];
pub const ADDR_HI_PINS: [u32; 5] = [BUS_PIN_A8, BUS_PIN_A9, BUS_PIN_A10, BUS_PIN_A11, BUS_PIN_A12];

// Host cycle-counter ticks, Raspberry Pi 3A+/3B+ at standard clocking.
pub const WAIT_FOR_SIGNALS: u32 = 40;
pub const WAIT_CYCLE_MULTIPLEXER: u32 = 200;
pub const WAIT_CYCLE_READ: u32 = 475;
pub const WAIT_CYCLE_WRITEDATA: u32 = 470;
pub const WAIT_CYCLE_READ_BADLINE: u32 = 400;
pub const WAIT_CYCLE_READ_VIC2: u32 = 445;
pub const WAIT_CYCLE_WRITEDATA_VIC2: u32 = 505;
pub const WAIT_CYCLE_MULTIPLEXER_VIC2: u32 = 265;
pub const WAIT_TRIGGER_DMA: u32 = 600;
pub const WAIT_RELEASE_DMA: u32 = 600;

// The C128 VIC-IIe needs longer before A8..A12 are stable.
pub const C128_MULTIPLEXER_EXTRA: u32 = 20;

pub const TIMING_OVERRIDE_COUNT: usize = 10;

// Number of guest cycles the CPU is held while a bank is pulled into the cache.
pub const NUM_DMA_CYCLES: u32 = 10;

// Images up to this size stay resident for the whole session.
pub const FAST_CACHE_BYTES: usize = 512 * 1024;

pub const RESET_DEBOUNCE_CYCLES: u32 = 3;
pub const RESET_RELEASE_DEBOUNCE_CYCLES: u32 = 30;
pub const RESET_COUNTER_CLAMP: u32 = 0x0800_0000;

pub const FREEZE_DEBOUNCE_CYCLES: u32 = 500_000;
// The NMI sequence pushes PCH, PCL and P: three write cycles in a row.
pub const FREEZE_WRITES: u8 = 3;

pub const C64GS_BANK_MASK: u8 = 0x3F;

pub const EASYFLASH_BANKS: usize = 64;
pub const EASYFLASH_BANK_MASK: u8 = 0x3F;
pub const EASYFLASH_CONTROL_MASK: u8 = 0x87;
pub const EASYFLASH_RAM_SIZE: usize = 256;
pub const EASYFLASH_SECTOR_BANKS: u8 = 8;

// EF3 USB registers, reused as the EAPI command channel.
pub const EF3_USB_CONTROL: u8 = 0x09;
pub const EF3_USB_DATA: u8 = 0x0A;
pub const EF3_USB_READY: u8 = 0x80 | 0x40;

pub const EAPI_CMD_INIT: u8 = 0xF0;
pub const EAPI_CMD_WRITE_FLASH: u8 = 0xF1;
pub const EAPI_CMD_ERASE_SECTOR: u8 = 0xF2;
pub const EAPI_REPLY_OK: u8 = 0x00;
pub const EAPI_REPLY_WRITE_ERROR: u8 = 0xF1;

// The capacitor keeps /EXROM low for roughly 1000 cycles after the last access.
pub const EPYX_CAPACITOR_CYCLES: u32 = 512 * 2;

pub const ACTION_REPLAY_RAM_SIZE: usize = 8 * 1024;
pub const SUPER_SNAPSHOT_RAM_SIZE: usize = 32 * 1024;

pub const GMOD2_EEPROM_WORDS: usize = 1024;
pub const GMOD2_EEPROM_BYTES: usize = GMOD2_EEPROM_WORDS * 2;
