//! Round-robin address selection.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

/// Independent rotating cursor per backend.
#[derive(Default)]
pub struct RoundRobin {
    cursors: DashMap<String, AtomicUsize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next address for `backend`, or `None` when the list is empty.
    pub fn pick<'a>(&self, backend: &str, addresses: &'a [String]) -> Option<&'a str> {
        if addresses.is_empty() {
            return None;
        }
        let n = match self.cursors.get(backend) {
            Some(cursor) => cursor.fetch_add(1, Ordering::Relaxed),
            None => self
                .cursors
                .entry(backend.to_string())
                .or_default()
                .fetch_add(1, Ordering::Relaxed),
        };
        addresses.get(n % addresses.len()).map(String::as_str)
    }
}
