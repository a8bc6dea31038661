use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide request tally. Each call to [`increment`](Self::increment) returns a
/// value no other caller will see.
#[derive(Debug, Default)]
pub struct RequestCounter {
    count: AtomicU64,
}

impl RequestCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return the post-increment value.
    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn current(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
