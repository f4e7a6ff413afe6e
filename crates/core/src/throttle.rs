use crate::domain::RunState;
use chrono::{DateTime, Utc};

pub const DEFAULT_MIN_DAYS: i64 = 7;

/// Decision taken before anything touches the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Proceed,
    Skip {
        last_run: DateTime<Utc>,
        elapsed_days: i64,
    },
}

/// Allows a run only when at least `min_days` whole days passed since the
/// last successful one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleGate {
    min_days: i64,
}

impl ThrottleGate {
    pub fn new(min_days: i64) -> Self {
        Self { min_days }
    }

    pub fn weekly() -> Self {
        Self::new(DEFAULT_MIN_DAYS)
    }

    pub fn min_days(&self) -> i64 {
        self.min_days
    }

    /// A `last_run` in the future counts as negative elapsed time and skips.
    pub fn check(&self, state: &RunState, now: DateTime<Utc>) -> Gate {
        match state.last_run {
            None => Gate::Proceed,
            Some(last_run) => {
                let elapsed_days = (now - last_run).num_days();
                if elapsed_days < self.min_days {
                    Gate::Skip {
                        last_run,
                        elapsed_days,
                    }
                } else {
                    Gate::Proceed
                }
            }
        }
    }
}

impl Default for ThrottleGate {
    fn default() -> Self {
        Self::weekly()
    }
}
