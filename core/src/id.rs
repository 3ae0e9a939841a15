//! Unique string identifiers: a fixed prefix plus a monotonically
//! increasing counter.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct UniqueIdFactory {
    prefix: String,
    counter: AtomicU64,
}

impl UniqueIdFactory {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Returns a value never returned before by this factory.
    pub fn next_id(&self) -> String {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{index}", self.prefix)
    }
}
