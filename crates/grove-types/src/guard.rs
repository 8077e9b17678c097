//! Single-operation-in-flight guard.
//!
//! Every state-mutating entry point enters the guard first. A second entry
//! while the first is still in flight (for example a callback re-invoking
//! `withdraw`) is rejected with [`Reentrant`]. The flag clears when the
//! [`Entered`] token drops, so it is released on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::Reentrant;

/// Per-instance in-flight flag.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    in_flight: Arc<AtomicBool>,
}

/// Proof that the guard is held. Releases it on drop.
#[derive(Debug)]
#[must_use = "the guard is released as soon as this token is dropped"]
pub struct Entered {
    flag: Arc<AtomicBool>,
}

impl ReentrancyGuard {
    /// A fresh, released guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an operation as in flight.
    ///
    /// # Errors
    ///
    /// - [`Reentrant`] if another operation already holds the guard
    pub fn enter(&self) -> Result<Entered, Reentrant> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::warn!("re-entrant call rejected");
            return Err(Reentrant);
        }
        Ok(Entered {
            flag: Arc::clone(&self.in_flight),
        })
    }

    /// Whether an operation currently holds the guard.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Drop for Entered {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
