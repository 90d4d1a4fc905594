//! Randomized pacing for the playback.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::DelayRange;

/// Source of randomized durations.
pub trait Pacing: Send + Sync {
    /// A value in the half-open range `[min, max)`. Returns `min` when the range is empty.
    fn next_in_range(&self, min: u64, max: u64) -> u64;

    fn next_in(&self, range: DelayRange) -> u64 {
        self.next_in_range(range.min_ms, range.max_ms)
    }
}

/// Thread-local RNG pacing used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPacing;

impl Pacing for RandomPacing {
    fn next_in_range(&self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        rand::thread_rng().gen_range(min..max)
    }
}

/// Reproducible pacing from a fixed seed.
#[derive(Debug)]
pub struct SeededPacing {
    rng: Mutex<StdRng>,
}

impl SeededPacing {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Pacing for SeededPacing {
    fn next_in_range(&self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(min..max),
            Err(poisoned) => poisoned.into_inner().gen_range(min..max),
        }
    }
}

/// Always the lower bound. Makes every delay exact.
#[derive(Debug, Default, Clone, Copy)]
pub struct MinimumPacing;

impl Pacing for MinimumPacing {
    fn next_in_range(&self, min: u64, _max: u64) -> u64 {
        min
    }
}
