use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter used to drop responses of superseded async calls
///
/// Each call takes a ticket with [`Generation::next`]; when it completes, its
/// result is only applied if [`Generation::is_current`] still holds.
#[derive(Debug, Default)]
pub struct Generation(AtomicU64);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation and return its ticket
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.current() == ticket
    }
}
