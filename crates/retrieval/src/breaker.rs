//! One-way circuit breaker guarding a flaky external source.
//!
//! Closed until the first hard failure, then open for the rest of the
//! process. There is no timer-based recovery; restarting the process is the
//! reset path. The flag is a single atomic, so no lock is taken on the hot
//! path and a racing trip costs at most one extra doomed call.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerState {
    Closed,
    Open,
}

#[derive(Debug, Default)]
pub struct CircuitBreaker {
    open: AtomicBool,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Open the breaker. Returns `true` if this call performed the transition.
    pub fn trip(&self) -> bool {
        !self.open.swap(true, Ordering::AcqRel)
    }

    pub fn state(&self) -> BreakerState {
        if self.is_open() {
            BreakerState::Open
        } else {
            BreakerState::Closed
        }
    }
}
