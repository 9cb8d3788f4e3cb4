//! Round-robin endpoint selection

use std::sync::atomic::{AtomicU64, Ordering};

use super::DispatchError;

/// Fixed target list with a shared rotation counter
pub struct RoundRobin<T> {
    targets: Vec<T>,
    counter: AtomicU64,
}

impl<T> RoundRobin<T> {
    pub fn new(targets: Vec<T>) -> Result<Self, DispatchError> {
        if targets.is_empty() {
            return Err(DispatchError::NoEndpoints);
        }
        Ok(Self {
            targets,
            counter: AtomicU64::new(0),
        })
    }

    /// Next target with its index; one atomic increment per call
    pub fn next(&self) -> (usize, &T) {
        let ticket = self.counter.fetch_add(1, Ordering::Relaxed);
        let index = (ticket % self.targets.len() as u64) as usize;
        (index, &self.targets[index])
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn targets(&self) -> &[T] {
        &self.targets
    }
}
