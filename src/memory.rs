use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::cartridge::crt::CrtError;
use crate::consts::*;
use crate::ram::CartRam;

/// Moves the low address byte to the top of a 13-bit offset.
///
/// The low byte is sampled first in every cycle, so using it as the high part
/// of the storage index lets the lookup start before A8..A12 are known.
#[inline]
#[must_use]
pub const fn linear_to_cache_order(offset: u16) -> u16 {
    ((offset & 0xff) << 5) | ((offset >> 8) & 0x1f)
}

#[inline]
#[must_use]
pub const fn cache_to_linear(cached: u16) -> u16 {
    ((cached & 0x1f) << 8) | ((cached >> 5) & 0xff)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    /// ROML and ROMH bytes of the same offset sit next to each other.
    Interleaved,
    /// One 8K window per bank; ROMH mirrors it.
    RomlOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(usize)]
pub enum Window {
    RomL = 0,
    RomH = 1,
}

impl Window {
    #[inline]
    #[must_use]
    pub fn from_a13(address: u16) -> Self {
        if address & 0x2000 != 0 {
            Window::RomH
        } else {
            Window::RomL
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BankedMemoryStore {
    layout: Layout,
    banks: usize,
    #[serde(skip)]
    rom: Vec<u8>,
    ram: CartRam,
}

impl BankedMemoryStore {
    pub fn new(layout: Layout, banks: usize, ram_size: usize) -> Self {
        let mut s = Self {
            layout,
            banks: 0,
            rom: vec![],
            ram: CartRam::new(ram_size),
        };
        s.ensure_banks(banks.max(1));
        s
    }

    #[inline]
    fn bank_stride(&self) -> usize {
        match self.layout {
            Layout::Interleaved => WINDOW_SIZE * 2,
            Layout::RomlOnly => WINDOW_SIZE,
        }
    }

    #[inline]
    fn index(&self, bank: usize, window: Window, cached: u16) -> usize {
        let bank = if bank < self.banks { bank } else { bank % self.banks };
        let cached = (cached & WINDOW_MASK) as usize;
        match self.layout {
            Layout::Interleaved => ((bank * WINDOW_SIZE + cached) << 1) | window as usize,
            Layout::RomlOnly => bank * WINDOW_SIZE + cached,
        }
    }

    pub fn ensure_banks(&mut self, banks: usize) {
        if banks > self.banks {
            self.banks = banks;
            self.rom.resize(banks * self.bank_stride(), 0xff);
        }
    }

    #[inline]
    #[must_use]
    pub fn read(&self, window: Window, bank: usize, offset: u16) -> u8 {
        self.read_cached(window, bank, linear_to_cache_order(offset))
    }

    /// Same as `read` for an offset already in cache order.
    #[inline]
    #[must_use]
    pub fn read_cached(&self, window: Window, bank: usize, cached: u16) -> u8 {
        self.rom[self.index(bank, window, cached)]
    }

    /// Both candidates of an interleaved offset in one fetch, ROML in the low byte.
    #[inline]
    #[must_use]
    pub fn read_pair(&self, bank: usize, cached: u16) -> u16 {
        let i = self.index(bank, Window::RomL, cached);
        match self.layout {
            Layout::Interleaved => u16::from_le_bytes([self.rom[i], self.rom[i + 1]]),
            Layout::RomlOnly => u16::from_le_bytes([self.rom[i], self.rom[i]]),
        }
    }

    /// Flash program cycle: bits can only be cleared.
    pub fn program(&mut self, window: Window, bank: usize, offset: u16, value: u8) {
        let i = self.index(bank, window, linear_to_cache_order(offset));
        trace!("program {:?} bank {} 0x{:04x}: 0x{:02x} & 0x{:02x}", window, bank, offset, self.rom[i], value);
        self.rom[i] &= value;
    }

    pub fn write(&mut self, window: Window, bank: usize, offset: u16, value: u8) {
        let i = self.index(bank, window, linear_to_cache_order(offset));
        self.rom[i] = value;
    }

    /// Sets `count` banks of one window to all-ones.
    pub fn erase_sector(&mut self, window: Window, first_bank: usize, count: usize) {
        debug!("erase {:?} banks {}..{}", window, first_bank, first_bank + count);
        for bank in first_bank..(first_bank + count).min(self.banks) {
            match self.layout {
                Layout::Interleaved => {
                    let start = bank * WINDOW_SIZE * 2 + window as usize;
                    for i in (start..start + WINDOW_SIZE * 2).step_by(2) {
                        self.rom[i] = 0xff;
                    }
                }
                Layout::RomlOnly => {
                    let start = bank * WINDOW_SIZE;
                    self.rom[start..start + WINDOW_SIZE].fill(0xff);
                }
            }
        }
    }

    /// Copies a chip into place, mirroring chips smaller than their window.
    pub fn load_chip(&mut self, bank: usize, load_address: u16, data: &[u8]) -> Result<(), CrtError> {
        let bad = || CrtError::BadChip {
            bank: bank as u16,
            load_address,
            size: data.len(),
        };
        if data.is_empty() {
            return Err(bad());
        }

        let (window, start, room) = match load_address {
            ROML_ADDR => (Window::RomL, 0, WINDOW_SIZE * 2),
            ROMH_ADDR | ROMH_ULTIMAX_ADDR => (Window::RomH, 0, WINDOW_SIZE),
            0xB000 | 0xF000 => (Window::RomH, HALF_WINDOW, HALF_WINDOW),
            _ => return Err(bad()),
        };
        if data.len() > room {
            return Err(bad());
        }
        let last_bank = match self.layout {
            Layout::RomlOnly if data.len() > WINDOW_SIZE => bank * 2 + 1,
            _ => bank,
        };
        if (last_bank + 1) * self.bank_stride() > MAX_IMAGE_SIZE {
            return Err(bad());
        }

        if data.len() > WINDOW_SIZE {
            // 16K chip at $8000
            let (lo, hi) = data.split_at(WINDOW_SIZE);
            match self.layout {
                Layout::Interleaved => {
                    self.fill_window(bank, Window::RomL, 0, lo);
                    self.fill_window(bank, Window::RomH, 0, hi);
                }
                Layout::RomlOnly => {
                    self.fill_window(bank * 2, Window::RomL, 0, lo);
                    self.fill_window(bank * 2 + 1, Window::RomL, 0, hi);
                }
            }
        } else {
            let window = match self.layout {
                Layout::Interleaved => window,
                Layout::RomlOnly => Window::RomL,
            };
            self.fill_window(bank, window, start, data);
        }
        trace!("chip bank {} @ 0x{:04x}, {} bytes", bank, load_address, data.len());
        Ok(())
    }

    fn fill_window(&mut self, bank: usize, window: Window, start: usize, data: &[u8]) {
        self.ensure_banks(bank + 1);
        for (n, offset) in (start..WINDOW_SIZE).enumerate() {
            let i = self.index(bank, window, linear_to_cache_order(offset as u16));
            self.rom[i] = data[n % data.len()];
        }
    }

    /// Host addresses covering one bank, for cache prefetching.
    #[must_use]
    pub fn bank_bytes(&self, bank: usize) -> &[u8] {
        let stride = self.bank_stride();
        let bank = bank % self.banks;
        &self.rom[bank * stride..(bank + 1) * stride]
    }

    #[must_use]
    pub fn image(&self) -> &[u8] {
        &self.rom
    }

    pub fn restore_image(&mut self, data: &[u8]) -> bool {
        if data.len() != self.rom.len() {
            return false;
        }
        self.rom.copy_from_slice(data);
        true
    }

    #[must_use]
    pub fn fits_in_cache(&self) -> bool {
        self.rom.len() <= FAST_CACHE_BYTES
    }

    #[inline]
    #[must_use]
    pub fn banks(&self) -> usize {
        self.banks
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[inline]
    #[must_use]
    pub fn ram(&self) -> &CartRam {
        &self.ram
    }

    #[inline]
    pub fn ram_mut(&mut self) -> &mut CartRam {
        &mut self.ram
    }

    pub fn copy_from(&mut self, other: &BankedMemoryStore) {
        self.rom.clone_from(&other.rom);
        self.banks = other.banks;
    }
}

impl core::fmt::Debug for BankedMemoryStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "BankedMemoryStore {{ {:?}, banks:{}, bytes:{}, ram:{:?} }}",
            self.layout,
            self.banks,
            self.rom.len(),
            self.ram
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! T {
        ($b: expr) => {
            assert!($b);
        };
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed)).collect()
    }

    #[test]
    fn permutation_is_a_bijection() {
        let mut seen = vec![false; WINDOW_SIZE];
        for o in 0..WINDOW_SIZE as u16 {
            let c = linear_to_cache_order(o);
            T!((c as usize) < WINDOW_SIZE);
            T!(!seen[c as usize]);
            seen[c as usize] = true;
            T!(cache_to_linear(c) == o);
        }
    }

    #[test]
    fn interleaved_reads_come_back_per_window() {
        let mut s = BankedMemoryStore::new(Layout::Interleaved, 2, 0);
        let lo = pattern(WINDOW_SIZE, 1);
        let hi = pattern(WINDOW_SIZE, 2);
        s.load_chip(1, ROML_ADDR, &lo).unwrap();
        s.load_chip(1, ROMH_ADDR, &hi).unwrap();
        for o in [0u16, 1, 0x100, 0x1fff] {
            T!(s.read(Window::RomL, 1, o) == lo[o as usize]);
            T!(s.read(Window::RomH, 1, o) == hi[o as usize]);
            let pair = s.read_pair(1, linear_to_cache_order(o));
            T!(pair == u16::from_le_bytes([lo[o as usize], hi[o as usize]]));
        }
        T!(s.read(Window::RomL, 0, 0) == 0xff);
    }

    #[test]
    fn reads_are_idempotent() {
        let mut s = BankedMemoryStore::new(Layout::RomlOnly, 4, 0);
        s.load_chip(3, ROML_ADDR, &pattern(WINDOW_SIZE, 9)).unwrap();
        for o in (0..WINDOW_SIZE as u16).step_by(97) {
            let a = s.read(Window::RomL, 3, o);
            T!(a == s.read(Window::RomL, 3, o));
            T!(a == s.read(Window::RomH, 3, o));
        }
    }

    #[test]
    fn small_chips_are_mirrored() {
        let mut s = BankedMemoryStore::new(Layout::Interleaved, 1, 0);
        s.load_chip(0, ROML_ADDR, &pattern(HALF_WINDOW, 3)).unwrap();
        T!(s.read(Window::RomL, 0, 0x0123) == s.read(Window::RomL, 0, 0x1123));
        s.load_chip(0, 0xF000, &pattern(HALF_WINDOW, 4)).unwrap();
        T!(s.read(Window::RomH, 0, 0x0000) == 0xff);
        T!(s.read(Window::RomH, 0, 0x1000) == 4);
    }

    #[test]
    fn sixteen_k_chips_span_both_windows() {
        let data = pattern(WINDOW_SIZE * 2, 5);
        let mut s = BankedMemoryStore::new(Layout::Interleaved, 1, 0);
        s.load_chip(0, ROML_ADDR, &data).unwrap();
        T!(s.read(Window::RomH, 0, 0) == data[WINDOW_SIZE]);

        let mut s = BankedMemoryStore::new(Layout::RomlOnly, 1, 0);
        s.load_chip(1, ROML_ADDR, &data).unwrap();
        T!(s.banks() == 4);
        T!(s.read(Window::RomL, 3, 0) == data[WINDOW_SIZE]);
    }

    #[test]
    fn bad_chips_are_rejected() {
        let mut s = BankedMemoryStore::new(Layout::Interleaved, 1, 0);
        T!(matches!(s.load_chip(0, 0x9000, &[0; 16]), Err(CrtError::BadChip { .. })));
        T!(s.load_chip(0, ROMH_ADDR, &pattern(WINDOW_SIZE * 2, 0)).is_err());
        T!(s.load_chip(0, ROML_ADDR, &[]).is_err());
    }

    #[test]
    fn chips_past_the_image_pool_are_rejected() {
        let mut s = BankedMemoryStore::new(Layout::RomlOnly, 1, 0);
        T!(matches!(s.load_chip(0x3fff, ROML_ADDR, &[0; 16]), Err(CrtError::BadChip { bank: 0x3fff, .. })));
        T!(s.load_chip(127, ROML_ADDR, &[0; 16]).is_ok());
        T!(s.load_chip(64, ROML_ADDR, &pattern(WINDOW_SIZE * 2, 0)).is_err());
        T!(s.image().len() == MAX_IMAGE_SIZE);

        let mut s = BankedMemoryStore::new(Layout::Interleaved, 1, 0);
        T!(s.load_chip(0xffff, ROMH_ADDR, &[0; 16]).is_err());
        T!(s.load_chip(63, ROMH_ADDR, &[0; 16]).is_ok());
        T!(s.load_chip(64, ROML_ADDR, &[0; 16]).is_err());
        T!(s.banks() == 64);
    }

    #[test]
    fn program_ands_and_erase_sets_ones() {
        let mut s = BankedMemoryStore::new(Layout::Interleaved, 16, 0);
        s.load_chip(9, ROMH_ADDR, &[0xf0; WINDOW_SIZE]).unwrap();
        s.program(Window::RomH, 9, 0x10, 0x3c);
        T!(s.read(Window::RomH, 9, 0x10) == 0x30);
        s.erase_sector(Window::RomH, 8, 8);
        T!(s.read(Window::RomH, 9, 0x10) == 0xff);
        s.write(Window::RomL, 8, 0, 0x12);
        s.erase_sector(Window::RomH, 8, 8);
        T!(s.read(Window::RomL, 8, 0) == 0x12);
    }

    #[test]
    fn cache_fit_follows_image_size() {
        T!(BankedMemoryStore::new(Layout::RomlOnly, 64, 0).fits_in_cache());
        T!(!BankedMemoryStore::new(Layout::RomlOnly, 65, 0).fits_in_cache());
        T!(BankedMemoryStore::new(Layout::Interleaved, 32, 0).fits_in_cache());
        let s = BankedMemoryStore::new(Layout::Interleaved, 64, 0);
        T!(!s.fits_in_cache());
        T!(s.bank_bytes(3).len() == WINDOW_SIZE * 2);
    }
}
