use log::trace;
use serde::{Deserialize, Serialize};

/// On-cartridge SRAM. Sizes are powers of two so addresses wrap with a mask.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CartRam {
    data: Vec<u8>,
    mask: usize,
    writes: u64,
}

impl CartRam {
    pub fn new(size: usize) -> CartRam {
        CartRam {
            data: vec![0; size],
            mask: size.saturating_sub(1),
            writes: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, addr: usize) -> u8 {
        match self.data.get(addr & self.mask) {
            Some(v) => *v,
            None => 0,
        }
    }

    #[inline]
    pub fn set(&mut self, addr: usize, data: u8) {
        if let Some(v) = self.data.get_mut(addr & self.mask) {
            trace!("> Poke RAM 0x{:04x} = 0x{:02x}", addr & self.mask, data);
            *v = data;
            self.writes += 1;
        }
    }

    pub fn fill(&mut self, v: u8) {
        self.data.fill(v);
    }

    pub fn copy(&mut self, dest: usize, buf: &[u8]) {
        let d = dest & self.mask;
        let end = (d + buf.len()).min(self.data.len());
        self.data[d..end].copy_from_slice(&buf[..end - d]);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl core::fmt::Debug for CartRam {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "CartRam {{ size:{} writes:{} }}", self.data.len(), self.writes)
    }
}
