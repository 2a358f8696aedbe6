//! Connection-active flag
//!
//! The only coordination signal between the two relay tasks. It starts
//! active and can only ever move to inactive.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared, one-way "connection is active" flag
#[derive(Debug, Clone)]
pub struct ConnectionActive(Arc<AtomicBool>);

impl ConnectionActive {
    /// Create an active flag
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Create a flag that is already inactive
    pub fn tripped() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Whether the connection is still considered active
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Mark the connection inactive.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn deactivate(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl Default for ConnectionActive {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_active() {
        assert!(ConnectionActive::new().is_active());
        assert!(!ConnectionActive::tripped().is_active());
    }

    #[test]
    fn test_deactivate_is_idempotent() {
        let flag = ConnectionActive::new();
        assert!(flag.deactivate());
        assert!(!flag.deactivate());
        assert!(!flag.is_active());
    }

    #[test]
    fn test_clones_share_state() {
        let flag = ConnectionActive::new();
        let other = flag.clone();
        other.deactivate();
        assert!(!flag.is_active());
    }

    #[test]
    fn test_tripped_deactivate_reports_no_transition() {
        assert!(!ConnectionActive::tripped().deactivate());
    }
}
