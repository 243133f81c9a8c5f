//! Cooperative cancellation

use crate::{MacroError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared one-way stop latch
///
/// Clones share the same flag. Once requested, the stop stays latched until
/// `clear` is called between macro runs.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    stop: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch the stop request
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Reset the latch; only valid while no macro is running
    pub fn clear(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }

    /// Fail with `MacroStopped` if a stop was requested
    pub fn check(&self) -> Result<()> {
        if self.stop_requested() {
            Err(MacroError::MacroStopped)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_latch_is_shared_and_sticky() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());

        thread::spawn(move || other.request_stop()).join().unwrap();
        assert!(token.stop_requested());
        assert!(token.check().unwrap_err().is_stop());
        assert!(token.check().unwrap_err().is_stop());

        token.clear();
        assert!(token.check().is_ok());
    }
}
