use serde::{Deserialize, Serialize};

use crate::bus::ControlLines;

/// What the PLA makes of the EXROM/GAME pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryMode {
    #[default]
    Off,
    Mode8K,
    Mode16K,
    Ultimax,
}

impl MemoryMode {
    #[must_use]
    pub fn from_lines(exrom_high: bool, game_high: bool) -> Self {
        match (exrom_high, game_high) {
            (true, true) => MemoryMode::Off,
            (false, true) => MemoryMode::Mode8K,
            (false, false) => MemoryMode::Mode16K,
            (true, false) => MemoryMode::Ultimax,
        }
    }

    #[inline]
    #[must_use]
    pub fn exrom_high(&self) -> bool {
        matches!(self, MemoryMode::Off | MemoryMode::Ultimax)
    }

    #[inline]
    #[must_use]
    pub fn game_high(&self) -> bool {
        matches!(self, MemoryMode::Off | MemoryMode::Mode8K)
    }

    #[must_use]
    pub fn lines(&self) -> ControlLines {
        let mut l = ControlLines::empty();
        l.set(ControlLines::EXROM, self.exrom_high());
        l.set(ControlLines::GAME, self.game_high());
        l
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankRegister {
    bank: usize,
    control: u8,
    export_ram: bool,
    enabled: bool,
}

impl BankRegister {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bank: 0,
            control: 0,
            export_ram: false,
            enabled: true,
        }
    }

    #[inline]
    #[must_use]
    pub fn bank(&self) -> usize {
        self.bank
    }

    #[inline]
    pub fn set_bank(&mut self, bank: usize) {
        self.bank = bank;
    }

    #[inline]
    #[must_use]
    pub fn control(&self) -> u8 {
        self.control
    }

    #[inline]
    pub fn set_control(&mut self, control: u8) {
        self.control = control;
    }

    #[inline]
    #[must_use]
    pub fn export_ram(&self) -> bool {
        self.export_ram
    }

    #[inline]
    pub fn set_export_ram(&mut self, export_ram: bool) {
        self.export_ram = export_ram;
    }

    #[inline]
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl Default for BankRegister {
    fn default() -> Self {
        BankRegister::new()
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

    #[test]
    fn modes_map_to_line_levels() {
        for m in [MemoryMode::Off, MemoryMode::Mode8K, MemoryMode::Mode16K, MemoryMode::Ultimax] {
            T!(MemoryMode::from_lines(m.exrom_high(), m.game_high()) == m);
        }
        T!(MemoryMode::Ultimax.lines() == ControlLines::EXROM);
        T!(MemoryMode::Mode16K.lines().is_empty());
    }
}
