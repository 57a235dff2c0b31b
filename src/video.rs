use log::trace;
use serde::{Deserialize, Serialize};

use crate::bus::{BusCycleSample, BusLines, BusSampler};
use crate::cartridge::Cartridge;
use crate::timing::{HardwareTiming, TimingProfile};

/// VIC fetches from ROMH: in its own half-cycle, and in the CPU half while
/// it holds BA low on a badline. Neither touches cartridge registers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoWindowHandler {
    vic_reads: u64,
    badline_reads: u64,
}

impl VideoWindowHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// VIC half of the cycle. Returns the byte driven, if any.
    pub fn serve_vic_half<L: BusLines, H: HardwareTiming>(
        &mut self,
        sample: &BusCycleSample,
        cart: &Cartridge,
        lines: &mut L,
        hw: &mut H,
        timing: &TimingProfile,
    ) -> Option<u8> {
        let d = cart.vic_read(sample)?;
        lines.drive_data(d);
        hw.wait_until(timing.read_vic2());
        lines.release_data();
        self.vic_reads += 1;
        trace!("vic 0x{:04x} -> 0x{:02x}", sample.address(), d);
        Some(d)
    }

    /// CPU half with BA low. Short boards take a second look at the selects
    /// before answering.
    pub fn serve_badline<L: BusLines, H: HardwareTiming>(
        &mut self,
        sample: &BusCycleSample,
        sampler: &BusSampler,
        cart: &Cartridge,
        lines: &mut L,
        hw: &mut H,
        timing: &TimingProfile,
    ) -> Option<u8> {
        let sample = sampler.resample_phase2(*sample, lines);
        let d = cart.vic_read(&sample)?;
        lines.drive_data(d);
        hw.wait_until(timing.read_badline());
        lines.release_data();
        self.badline_reads += 1;
        trace!("badline 0x{:04x} -> 0x{:02x}", sample.address(), d);
        Some(d)
    }

    #[must_use]
    pub fn vic_reads(&self) -> u64 {
        self.vic_reads
    }

    #[must_use]
    pub fn badline_reads(&self) -> u64 {
        self.badline_reads
    }
}
