mod action_replay;
mod final_cartridge3;
mod freeze_frame;
mod super_snapshot5;

pub use action_replay::ActionReplay;
pub use final_cartridge3::FinalCartridge3;
pub use freeze_frame::FreezeFrame;
pub use super_snapshot5::SuperSnapshot5;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::bus::BusCycleSample;
use crate::consts::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FreezeState {
    Idle,
    /// NMI is pulled, counting the writes of the interrupt entry.
    Armed { writes: u8 },
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeEvent {
    None,
    Armed,
    Frozen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreezeController {
    state: FreezeState,
    debounce: u32,
    prev_button: bool,
    freezes: u64,
}

impl FreezeController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: FreezeState::Idle,
            debounce: 0,
            prev_button: false,
            freezes: 0,
        }
    }

    /// One CPU half-cycle.
    pub fn observe(&mut self, sample: &BusCycleSample) -> FreezeEvent {
        let edge = sample.button() && !self.prev_button;
        self.prev_button = sample.button();

        if self.debounce > 0 {
            self.debounce -= 1;
        } else if edge {
            self.debounce = FREEZE_DEBOUNCE_CYCLES;
            self.state = FreezeState::Armed { writes: 0 };
            debug!("freeze armed");
            return FreezeEvent::Armed;
        }

        if let FreezeState::Armed { writes } = self.state {
            if sample.cpu_writes() {
                let writes = writes + 1;
                if writes == FREEZE_WRITES {
                    self.state = FreezeState::Active;
                    self.freezes += 1;
                    debug!("freeze #{} active", self.freezes);
                    return FreezeEvent::Frozen;
                }
                self.state = FreezeState::Armed { writes };
            } else {
                self.state = FreezeState::Armed { writes: 0 };
            }
        }
        FreezeEvent::None
    }

    /// Reset wins over any freeze in progress.
    pub fn reset(&mut self) {
        self.state = FreezeState::Idle;
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> FreezeState {
        self.state
    }

    #[must_use]
    pub fn freezes(&self) -> u64 {
        self.freezes
    }
}

impl Default for FreezeController {
    fn default() -> Self {
        FreezeController::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusWindows;
    use test_log::test;

    macro_rules! T {
        ($b: expr) => {
            assert!($b);
        };
    }

    fn press() -> BusCycleSample {
        BusCycleSample::idle(true).with_button(true)
    }

    fn write() -> BusCycleSample {
        BusCycleSample::cpu_write(BusWindows::empty(), 0x01fd, 0x12)
    }

    #[test]
    fn three_writes_after_the_edge_freeze() {
        let mut f = FreezeController::new();
        T!(f.observe(&press()) == FreezeEvent::Armed);
        T!(f.state() == FreezeState::Armed { writes: 0 });
        T!(f.observe(&BusCycleSample::idle(true)) == FreezeEvent::None);
        T!(f.observe(&write()) == FreezeEvent::None);
        T!(f.observe(&write()) == FreezeEvent::None);
        T!(f.observe(&write()) == FreezeEvent::Frozen);
        T!(f.state() == FreezeState::Active);
    }

    #[test]
    fn interrupted_write_run_starts_over() {
        let mut f = FreezeController::new();
        f.observe(&press());
        f.observe(&write());
        f.observe(&write());
        f.observe(&BusCycleSample::idle(true));
        T!(f.state() == FreezeState::Armed { writes: 0 });
        f.observe(&write());
        f.observe(&write());
        T!(f.state() == FreezeState::Armed { writes: 2 });
        f.reset();
        T!(f.state() == FreezeState::Idle);
    }

    #[test]
    fn held_button_is_one_press() {
        let mut f = FreezeController::new();
        T!(f.observe(&press()) == FreezeEvent::Armed);
        for _ in 0..10 {
            T!(f.observe(&press()) == FreezeEvent::None);
        }
        f.reset();
        f.observe(&BusCycleSample::idle(true));
        T!(f.observe(&press()) == FreezeEvent::None);
        T!(f.state() == FreezeState::Idle);
    }

    #[test]
    fn debounce_expires() {
        let mut f = FreezeController::new();
        f.observe(&press());
        f.reset();
        for _ in 0..FREEZE_DEBOUNCE_CYCLES {
            f.observe(&BusCycleSample::idle(true));
        }
        T!(f.observe(&press()) == FreezeEvent::Armed);
    }
}
