use log::debug;
use serde::{Deserialize, Serialize};

use crate::consts::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetPolicy {
    /// Reinitialise while the line is still held low.
    WhileHeld,
    /// Reinitialise when the line goes back high after a long enough pulse.
    OnRelease,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetMonitor {
    policy: ResetPolicy,
    counter: u32,
    held: bool,
    fired: u64,
}

impl ResetMonitor {
    #[must_use]
    pub fn new(policy: ResetPolicy) -> Self {
        Self {
            policy,
            counter: 0,
            held: false,
            fired: 0,
        }
    }

    /// Feeds one cycle of the RESET line. Returns true exactly once per pulse.
    pub fn tick(&mut self, asserted: bool) -> bool {
        self.held = asserted;
        let fire = match self.policy {
            ResetPolicy::WhileHeld => {
                if asserted {
                    self.counter = self.counter.saturating_add(1);
                    if self.counter > RESET_DEBOUNCE_CYCLES && self.counter < RESET_COUNTER_CLAMP {
                        self.counter = RESET_COUNTER_CLAMP;
                        true
                    } else {
                        false
                    }
                } else {
                    self.counter = 0;
                    false
                }
            }
            ResetPolicy::OnRelease => {
                if asserted {
                    self.counter = self.counter.saturating_add(1).min(RESET_COUNTER_CLAMP);
                    false
                } else {
                    let long_enough = self.counter > RESET_RELEASE_DEBOUNCE_CYCLES;
                    self.counter = 0;
                    long_enough
                }
            }
        };
        if fire {
            self.fired += 1;
            debug!("reset #{} ({:?})", self.fired, self.policy);
        }
        fire
    }

    #[must_use]
    pub fn policy(&self) -> ResetPolicy {
        self.policy
    }

    #[inline]
    #[must_use]
    pub fn held(&self) -> bool {
        self.held
    }

    #[must_use]
    pub fn fired(&self) -> u64 {
        self.fired
    }
}

impl Default for ResetMonitor {
    fn default() -> Self {
        ResetMonitor::new(ResetPolicy::WhileHeld)
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

    fn pulse(r: &mut ResetMonitor, cycles: u32) -> u32 {
        let mut fired = 0;
        for _ in 0..cycles {
            fired += r.tick(true) as u32;
        }
        fired + r.tick(false) as u32
    }

    #[test]
    fn short_pulses_are_ignored() {
        let mut r = ResetMonitor::default();
        T!(pulse(&mut r, RESET_DEBOUNCE_CYCLES) == 0);
        T!(r.fired() == 0);
    }

    #[test]
    fn long_pulse_fires_once() {
        let mut r = ResetMonitor::default();
        T!(pulse(&mut r, 10_000) == 1);
        T!(pulse(&mut r, 10_000) == 1);
        T!(r.fired() == 2);
    }

    #[test]
    fn fires_on_the_fourth_held_cycle() {
        let mut r = ResetMonitor::default();
        for _ in 0..RESET_DEBOUNCE_CYCLES {
            T!(!r.tick(true));
        }
        T!(r.tick(true));
        T!(r.held());
    }

    #[test]
    fn release_policy_waits_for_the_line_to_go_high() {
        let mut r = ResetMonitor::new(ResetPolicy::OnRelease);
        for _ in 0..100 {
            T!(!r.tick(true));
        }
        T!(r.tick(false));
        T!(!r.tick(false));
        T!(pulse(&mut r, RESET_RELEASE_DEBOUNCE_CYCLES) == 0);
    }
}
