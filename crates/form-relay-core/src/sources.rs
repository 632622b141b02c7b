//! # Clock, Entropy and Sequence Sources
//!
//! Key generation and field mapping read the current time, draw random
//! numbers and take sequence numbers. Those reads go through the traits in
//! this module so the `date` and `composite` strategies are reproducible in
//! tests and the random strategies can be seeded.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a single instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    /// Returns `None` when `value` is not RFC 3339.
    pub fn from_rfc3339(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Source of random numbers
pub trait Entropy: Send + Sync {
    /// Fill `dest` with random bytes.
    fn fill_bytes(&self, dest: &mut [u8]);

    /// Uniform value in `0..upper`. `upper` must be non-zero.
    fn below(&self, upper: u64) -> u64;
}

/// Thread-local operating-system seeded generator
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadEntropy;

impl Entropy for ThreadEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) {
        rand::thread_rng().fill_bytes(dest);
    }

    fn below(&self, upper: u64) -> u64 {
        rand::thread_rng().gen_range(0..upper.max(1))
    }
}

/// Deterministic generator for reproducible tests
#[derive(Debug)]
pub struct SeededEntropy {
    rng: Mutex<StdRng>,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Entropy for SeededEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.fill_bytes(dest);
    }

    fn below(&self, upper: u64) -> u64 {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_range(0..upper.max(1))
    }
}

/// Monotonic counters, one per named scope
pub trait SequenceSource: Send + Sync {
    /// Next value for `scope`. A scope that has never been used starts at
    /// `start_at`.
    fn next_value(&self, scope: &str, start_at: u64) -> u64;
}

/// Process-local counters
///
/// Values restart when the process restarts.
#[derive(Debug, Default)]
pub struct InMemorySequence {
    counters: Mutex<HashMap<String, u64>>,
}

impl InMemorySequence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceSource for InMemorySequence {
    fn next_value(&self, scope: &str, start_at: u64) -> u64 {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let counter = counters.entry(scope.to_string()).or_insert(start_at);
        let value = *counter;
        *counter = counter.saturating_add(1);
        value
    }
}

#[cfg(test)]
#[path = "sources_tests.rs"]
mod tests;
