//! First-writer-wins error capture shared by parallel strip workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::types::SortError;

/// Thread-safe receptacle for the first error raised by any worker.
///
/// Workers poll [`ErrorTrap::is_set`] before starting a strip so that a
/// failure in one strip short-circuits the rest without a rendezvous.
#[derive(Debug, Default)]
pub struct ErrorTrap {
    set: AtomicBool,
    error: Mutex<Option<SortError>>,
}

impl ErrorTrap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error` unless an earlier error was already recorded.
    pub fn set(&self, error: SortError) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(error);
            self.set.store(true, Ordering::Release);
        }
    }

    /// Whether an error has been recorded.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// Message of the recorded error, if any. The error stays in the trap.
    #[must_use]
    pub fn err(&self) -> Option<String> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(ToString::to_string)
    }

    /// Consume the trap, turning a recorded error into `Err`.
    ///
    /// # Errors
    ///
    /// Returns the first error recorded with [`ErrorTrap::set`].
    pub fn into_result(self) -> Result<(), SortError> {
        match self.error.into_inner().unwrap_or_else(PoisonError::into_inner) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
