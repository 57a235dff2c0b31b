use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CrtHeader {
    header_len: u32,
    version: u16,
    hw_type: u16,
    exrom: u8,
    game: u8,
    subtype: u8,
    name: String,
}

impl CrtHeader {
    pub fn new() -> Self {
        Self {
            header_len: 0x40,
            version: 0x0100,
            hw_type: 0,
            exrom: 1,
            game: 1,
            subtype: 0,
            name: "unknown".to_string(),
        }
    }

    pub fn header_len(&self) -> u32 {
        self.header_len
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn hw_type(&self) -> u16 {
        self.hw_type
    }

    /// EXROM line level declared by the image, high when non-zero.
    pub fn exrom_high(&self) -> bool {
        self.exrom != 0
    }

    pub fn game_high(&self) -> bool {
        self.game != 0
    }

    pub fn subtype(&self) -> u8 {
        self.subtype
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_header_len(&mut self, header_len: u32) {
        self.header_len = header_len;
    }

    pub fn set_version(&mut self, version: u16) {
        self.version = version;
    }

    pub fn set_hw_type(&mut self, hw_type: u16) {
        self.hw_type = hw_type;
    }

    pub fn set_lines(&mut self, exrom: u8, game: u8) {
        self.exrom = exrom;
        self.game = game;
    }

    pub fn set_subtype(&mut self, subtype: u8) {
        self.subtype = subtype;
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl Default for CrtHeader {
    fn default() -> Self {
        Self::new()
    }
}
