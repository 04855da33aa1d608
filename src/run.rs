//! Run-wide stop conditions: Ctrl-C and an optional deadline.
//!
//! Store calls and file I/O carry no timeouts of their own. A [`RunGuard`] is
//! consulted between files and before every upload task, so an interrupted
//! or overdue run stops at the next boundary instead of hanging on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Why a run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    Interrupted,
    DeadlineExceeded,
}

/// Cheap to clone; clones share the interrupt flag.
#[derive(Debug, Clone)]
pub struct RunGuard {
    interrupted: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Default for RunGuard {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RunGuard {
    /// Guard whose deadline is `timeout` from now, if any.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            interrupted: Arc::new(AtomicBool::new(false)),
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    /// Flag to set from a signal handler.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn check(&self) -> Result<(), Stop> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(Stop::Interrupted);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Stop::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}
