use serde::{Deserialize, Serialize};
use std::fmt;

/// Mutation counter owned by a single mutable entity.
///
/// The counter is bumped exactly once per committed mutation. Dependent caches
/// remember the value they observed and compare it against [`VersionCounter::current`]
/// to decide whether their data is stale. It never decreases except through an
/// explicit [`VersionCounter::reset`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VersionCounter(u64);

impl VersionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.0
    }

    #[inline]
    pub fn increment(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    #[inline]
    pub fn is_stale(&self, observed: u64) -> bool {
        observed != self.0
    }
}

impl fmt::Display for VersionCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
