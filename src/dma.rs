use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::consts::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaAction {
    None,
    /// Pull DMA low and fill the cache with the active bank.
    Assert,
    Release,
}

/// Holds the guest CPU off the bus while a freshly selected bank is pulled
/// into the host cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DmaStallController {
    inert: bool,
    trigger: Option<u32>,
    release: Option<u32>,
    stalls: u64,
}

impl DmaStallController {
    #[must_use]
    pub fn new(inert: bool) -> Self {
        Self {
            inert,
            ..Default::default()
        }
    }

    /// Bank switch notification. Ignored when the whole image is resident.
    pub fn request(&mut self, delay: u32) {
        if self.inert {
            return;
        }
        self.hold(delay);
    }

    /// Stall regardless of cache residency, for slow flash operations.
    pub fn hold(&mut self, delay: u32) {
        if self.release.is_some() {
            self.release = Some(NUM_DMA_CYCLES);
            trace!("stall extended");
        } else {
            self.trigger = Some(delay);
        }
    }

    pub fn tick(&mut self) -> DmaAction {
        if let Some(t) = self.trigger {
            if t == 0 {
                self.trigger = None;
                self.release = Some(NUM_DMA_CYCLES);
                self.stalls += 1;
                debug!("stall #{}", self.stalls);
                return DmaAction::Assert;
            }
            self.trigger = Some(t - 1);
            return DmaAction::None;
        }

        match self.release {
            Some(r) if r <= 1 => {
                self.release = None;
                DmaAction::Release
            }
            Some(r) => {
                self.release = Some(r - 1);
                DmaAction::None
            }
            None => DmaAction::None,
        }
    }

    /// Drops any pending or running stall. The line goes back high.
    pub fn clear(&mut self) {
        self.trigger = None;
        self.release = None;
    }

    #[inline]
    #[must_use]
    pub fn line_asserted(&self) -> bool {
        self.release.is_some()
    }

    #[must_use]
    pub fn pending(&self) -> bool {
        self.trigger.is_some()
    }

    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.inert
    }

    #[must_use]
    pub fn stalls(&self) -> u64 {
        self.stalls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    macro_rules! T {
        ($b: expr) => {
            assert!($b);
        };
    }

    fn run(dma: &mut DmaStallController, cycles: u32) -> Vec<DmaAction> {
        (0..cycles).map(|_| dma.tick()).collect()
    }

    #[test]
    fn inert_controller_never_stalls() {
        let mut dma = DmaStallController::new(true);
        dma.request(0);
        T!(!dma.pending());
        T!(run(&mut dma, 20).iter().all(|a| *a == DmaAction::None));
        T!(dma.stalls() == 0);
    }

    #[test]
    fn line_is_held_for_the_whole_countdown() {
        let mut dma = DmaStallController::new(false);
        dma.request(2);
        T!(dma.pending() && !dma.line_asserted());
        T!(run(&mut dma, 2) == [DmaAction::None, DmaAction::None]);
        T!(!dma.line_asserted());
        T!(dma.tick() == DmaAction::Assert);
        T!(!dma.pending());
        for _ in 0..NUM_DMA_CYCLES - 1 {
            T!(dma.line_asserted());
            T!(dma.tick() == DmaAction::None);
        }
        T!(dma.tick() == DmaAction::Release);
        T!(!dma.line_asserted() && !dma.pending());
    }

    #[test]
    fn trigger_and_release_never_overlap() {
        let mut dma = DmaStallController::new(false);
        for cycle in 0..40u32 {
            if cycle % 7 == 0 {
                dma.request(cycle % 3);
            }
            T!(!(dma.pending() && dma.line_asserted()));
            dma.tick();
        }
    }

    #[test]
    fn request_during_a_stall_restarts_the_release() {
        let mut dma = DmaStallController::new(false);
        dma.request(0);
        T!(dma.tick() == DmaAction::Assert);
        run(&mut dma, 5);
        dma.request(0);
        T!(!dma.pending());
        let actions = run(&mut dma, NUM_DMA_CYCLES);
        T!(actions.iter().filter(|a| **a == DmaAction::Release).count() == 1);
        T!(*actions.last().unwrap() == DmaAction::Release);
        T!(dma.stalls() == 1);
    }

    #[test]
    fn hold_bypasses_cache_residency() {
        let mut dma = DmaStallController::new(true);
        dma.hold(0);
        T!(dma.tick() == DmaAction::Assert);
        dma.clear();
        T!(!dma.line_asserted());
    }
}
