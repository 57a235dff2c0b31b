pub mod bus;
pub mod cartridge;
pub mod consts;
pub mod dma;
pub mod freezer;
pub mod memory;
pub mod persistence;
pub mod ram;
pub mod reset;
pub mod timing;
pub mod video;

use bus::*;
use cartridge::crt::{CrtError, CrtImage};
use cartridge::Cartridge;
use dma::DmaAction;
use log::{info, trace, warn};
use persistence::{PersistError, Persistence};
use reset::ResetMonitor;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use timing::{BoardConfig, HardwareTiming, TimingProfile};
use video::VideoWindowHandler;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot encoding failed: {0}")]
    Postcard(#[from] postcard::Error),
    #[error("snapshot was taken with image {found}, the running image is {expected}")]
    WrongImage { expected: String, found: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStats {
    pub cycles: u64,
    pub reads_driven: u64,
    pub writes: u64,
    pub stalls: u64,
    pub resets: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Engine {
    timing: TimingProfile,
    sampler: BusSampler,
    cart: Cartridge,
    reset: ResetMonitor,
    video: VideoWindowHandler,
    stats: CycleStats,
}

impl Engine {
    pub fn new(timing: TimingProfile, board: BoardConfig) -> Self {
        Self {
            timing,
            sampler: BusSampler::new(board),
            cart: Cartridge::none(),
            reset: ResetMonitor::default(),
            video: VideoWindowHandler::new(),
            stats: CycleStats::default(),
        }
    }

    /// Swaps in a new cartridge. A failed load leaves no cartridge plugged in.
    pub fn load_cart(&mut self, image: &CrtImage) -> Result<(), CrtError> {
        trace!("Load cart");
        match Cartridge::from_crt(image) {
            Err(e) => {
                warn!("cartridge rejected: {}", e);
                self.unplug();
                Err(e)
            }
            Ok(c) => {
                self.reset = ResetMonitor::new(c.reset_policy());
                self.cart = c;
                Ok(())
            }
        }
    }

    pub fn load_cart_from_slice(&mut self, data: &[u8]) -> Result<(), CrtError> {
        match CrtImage::parse(data) {
            Err(e) => {
                warn!("cartridge rejected: {}", e);
                self.unplug();
                Err(e)
            }
            Ok(image) => self.load_cart(&image),
        }
    }

    fn unplug(&mut self) {
        self.cart = Cartridge::none();
        self.reset = ResetMonitor::default();
    }

    /// Pulls a resident image into the cache once, before the first cycle.
    pub fn activate<H: HardwareTiming>(&mut self, hw: &mut H) {
        let store = self.cart.core().store();
        if store.fits_in_cache() {
            hw.prefetch(store.image());
            hw.force_read(store.image());
            info!("{} bytes preloaded", store.image().len());
        }
    }

    /// One half-cycle of the guest clock, from the interrupt to the control
    /// lines. Returns the byte driven on the data bus, if any.
    pub fn run_cycle<L: BusLines, H: HardwareTiming>(&mut self, lines: &mut L, hw: &mut H) -> Option<u8> {
        hw.restart();
        let early = self.sampler.sample_phase1(lines, hw, &self.timing);
        let sample = self.sampler.sample_phase2(early, lines, hw, &self.timing);
        self.stats.cycles += 1;

        if sample.vic_half() {
            let d = self.video.serve_vic_half(&sample, &self.cart, lines, hw, &self.timing);
            if d.is_some() {
                self.stats.reads_driven += 1;
            }
            lines.set_control(self.cart.control_lines());
            return d;
        }

        let driven = if sample.badline() {
            self.video.serve_badline(&sample, &self.sampler, &self.cart, lines, hw, &self.timing)
        } else {
            let d = self.cart.dispatch(&sample);
            if let Some(d) = d {
                lines.drive_data(d);
                hw.wait_until(self.timing.read_drive());
                lines.release_data();
            }
            if sample.cpu_writes() {
                self.stats.writes += 1;
            }
            d
        };
        if driven.is_some() {
            self.stats.reads_driven += 1;
        }

        match self.cart.core_mut().dma_mut().tick() {
            DmaAction::Assert => {
                hw.wait_until(self.timing.stall_assert());
                let core = self.cart.core();
                let bank = core.store().bank_bytes(core.regs().bank());
                hw.prefetch(bank);
                hw.force_read(bank);
                self.stats.stalls += 1;
            }
            DmaAction::Release => hw.wait_until(self.timing.stall_release()),
            DmaAction::None => (),
        }

        if self.reset.tick(sample.reset()) {
            self.cart.on_reset(sample.button());
            self.stats.resets += 1;
        }

        lines.set_control(self.cart.control_lines());
        driven
    }

    /// Stores dirty EEPROM/flash contents. Never call from the cycle handler.
    pub fn persist<P: Persistence>(&mut self, p: &P) -> Result<usize, PersistError> {
        self.cart.persist(p)
    }

    pub fn restore<P: Persistence>(&mut self, p: &P) -> Result<usize, PersistError> {
        self.cart.restore(p)
    }

    pub fn serialize_size(&self) -> Result<usize, SnapshotError> {
        Ok(postcard::experimental::serialized_size(&self)?)
    }

    pub fn timing(&self) -> &TimingProfile {
        &self.timing
    }

    pub fn sampler(&self) -> &BusSampler {
        &self.sampler
    }

    pub fn cart(&self) -> &Cartridge {
        &self.cart
    }

    pub fn cart_mut(&mut self) -> &mut Cartridge {
        &mut self.cart
    }

    pub fn reset_monitor(&self) -> &ResetMonitor {
        &self.reset
    }

    pub fn video(&self) -> &VideoWindowHandler {
        &self.video
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(TimingProfile::new(), BoardConfig::default())
    }
}

pub fn serialize(engine: &Engine, data: &mut [u8]) -> Result<usize, SnapshotError> {
    Ok(postcard::to_slice(engine, data)?.len())
}

/// Restores a snapshot. The ROM image is taken from `source`, which must be
/// running the same cartridge.
pub fn deserialize(data: &[u8], source: &Engine) -> Result<Engine, SnapshotError> {
    let mut engine = postcard::from_bytes::<Engine>(data)?;
    if engine.cart.md5() != source.cart.md5() {
        return Err(SnapshotError::WrongImage {
            expected: source.cart.md5().to_string(),
            found: engine.cart.md5().to_string(),
        });
    }
    engine.cart.copy_from(&source.cart);
    Ok(engine)
}

pub const fn info() -> (&'static str, &'static str) {
    ("cartbus", env!("CARGO_PKG_VERSION"))
}

pub const fn valid_extensions() -> &'static [&'static str] {
    &["crt"]
}
