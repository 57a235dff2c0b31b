use std::io::Read;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::crt_header::CrtHeader;
use crate::memory::{BankedMemoryStore, Layout};

pub const CRT_SIGNATURE: &[u8; 16] = b"C64 CARTRIDGE   ";
pub const CRT_HEADER_LENGTH: usize = 0x40;
const CHIP_SIGNATURE: &[u8; 4] = b"CHIP";
const CHIP_HEADER_LENGTH: usize = 0x10;

#[derive(Debug, Error)]
pub enum CrtError {
    #[error("not a CRT image")]
    BadSignature,
    #[error("image truncated at offset 0x{offset:x}, {needed} more bytes expected")]
    Truncated { offset: usize, needed: usize },
    #[error("unsupported cartridge hardware type {0}")]
    UnsupportedType(u16),
    #[error("chip for bank {bank} at 0x{load_address:04x} with {size} bytes does not fit a cartridge window")]
    BadChip { bank: u16, load_address: u16, size: usize },
    #[error("image contains no chip packets")]
    NoChips,
    #[error("cannot read image: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipPacket {
    pub chip_type: u16,
    pub bank: u16,
    pub load_address: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct CrtImage {
    header: CrtHeader,
    chips: Vec<ChipPacket>,
    md5: String,
}

fn be16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

fn be32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn need(data: &[u8], offset: usize, len: usize) -> Result<(), CrtError> {
    if data.len() < offset + len {
        return Err(CrtError::Truncated {
            offset,
            needed: offset + len - data.len(),
        });
    }
    Ok(())
}

impl CrtImage {
    pub fn new(header: CrtHeader, chips: Vec<ChipPacket>) -> Self {
        let mut img = Self {
            header,
            chips,
            md5: String::new(),
        };
        img.md5 = format!("{:x}", md5::compute(img.to_bytes()));
        img
    }

    pub fn parse(data: &[u8]) -> Result<Self, CrtError> {
        need(data, 0, CRT_HEADER_LENGTH)?;
        if &data[0..16] != CRT_SIGNATURE {
            return Err(CrtError::BadSignature);
        }

        let mut header = CrtHeader::new();
        header.set_header_len(be32(data, 0x10));
        header.set_version(be16(data, 0x14));
        header.set_hw_type(be16(data, 0x16));
        header.set_lines(data[0x18], data[0x19]);
        header.set_subtype(data[0x1a]);
        let name = &data[0x20..0x40];
        let end = name.iter().position(|b| *b == 0).unwrap_or(name.len());
        header.set_name(String::from_utf8_lossy(&name[..end]).trim_end().to_string());

        // Some tools write 0x20 here although the header is always 0x40 bytes.
        let mut offset = (header.header_len() as usize).max(CRT_HEADER_LENGTH);
        let mut chips = vec![];
        while offset + CHIP_HEADER_LENGTH <= data.len() {
            if &data[offset..offset + 4] != CHIP_SIGNATURE {
                warn!("garbage after chip #{} at 0x{:x}, ignored", chips.len(), offset);
                break;
            }
            let packet_len = be32(data, offset + 4) as usize;
            let size = be16(data, offset + 0x0e) as usize;
            let payload = offset + CHIP_HEADER_LENGTH;
            need(data, payload, size)?;
            let chip = ChipPacket {
                chip_type: be16(data, offset + 0x08),
                bank: be16(data, offset + 0x0a),
                load_address: be16(data, offset + 0x0c),
                data: data[payload..payload + size].to_vec(),
            };
            debug!("chip type {} bank {} @ 0x{:04x}, {} bytes", chip.chip_type, chip.bank, chip.load_address, size);
            chips.push(chip);
            offset += packet_len.max(CHIP_HEADER_LENGTH + size);
        }

        if chips.is_empty() {
            return Err(CrtError::NoChips);
        }

        Ok(Self {
            header,
            chips,
            md5: format!("{:x}", md5::compute(data)),
        })
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, CrtError> {
        let mut data = vec![];
        reader.read_to_end(&mut data)?;
        Self::parse(&data)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CRT_HEADER_LENGTH + self.chips.iter().map(|c| c.data.len() + CHIP_HEADER_LENGTH).sum::<usize>());
        out.extend_from_slice(CRT_SIGNATURE);
        out.extend_from_slice(&(CRT_HEADER_LENGTH as u32).to_be_bytes());
        out.extend_from_slice(&self.header.version().to_be_bytes());
        out.extend_from_slice(&self.header.hw_type().to_be_bytes());
        out.push(self.header.exrom_high() as u8);
        out.push(self.header.game_high() as u8);
        out.push(self.header.subtype());
        out.extend_from_slice(&[0; 5]);
        let mut name = [0u8; 32];
        let n = self.header.name().as_bytes();
        let l = n.len().min(32);
        name[..l].copy_from_slice(&n[..l]);
        out.extend_from_slice(&name);

        for c in &self.chips {
            out.extend_from_slice(CHIP_SIGNATURE);
            out.extend_from_slice(&((CHIP_HEADER_LENGTH + c.data.len()) as u32).to_be_bytes());
            out.extend_from_slice(&c.chip_type.to_be_bytes());
            out.extend_from_slice(&c.bank.to_be_bytes());
            out.extend_from_slice(&c.load_address.to_be_bytes());
            out.extend_from_slice(&(c.data.len() as u16).to_be_bytes());
            out.extend_from_slice(&c.data);
        }
        out
    }

    /// Lays every chip out in the given layout. `min_banks` reserves room,
    /// e.g. a full flash chip.
    pub fn build_store(&self, layout: Layout, min_banks: usize, ram_size: usize) -> Result<BankedMemoryStore, CrtError> {
        let mut store = BankedMemoryStore::new(layout, min_banks, ram_size);
        for c in &self.chips {
            store.load_chip(c.bank as usize, c.load_address, &c.data)?;
        }
        Ok(store)
    }

    pub fn header(&self) -> &CrtHeader {
        &self.header
    }

    pub fn chips(&self) -> &[ChipPacket] {
        &self.chips
    }

    pub fn md5(&self) -> &str {
        &self.md5
    }
}
