//! # Interaction Kernel Module
//!
//! Stateless evaluation of pairwise interactions between the atoms of a configuration.
//!
//! Every evaluation is governed by [`flags::KernelFlags`]: at most one exclusion rule and an
//! independent minimum-image bit. Combining two exclusion rules is rejected with
//! [`KernelError::ConflictingExclusions`] before any pair is evaluated.
//!
//! Whole-configuration totals split their outer loop across the workers of a process pool
//! with [`ProcessPool::interleaved_loop`](crate::core::pool::ProcessPool::interleaved_loop)
//! and combine the partial results with
//! [`ProcessPool::all_sum_by`](crate::core::pool::ProcessPool::all_sum_by) under the
//! [`PairSum`] strategy, so every worker returns the same total. With the `parallel`
//! feature each worker's share is further spread over rayon.

pub mod energy;
pub mod flags;
pub mod force;
pub mod geometry;

use crate::core::models::atom::Atom;
use crate::core::pool::{DivisionStrategy, PoolError};
use thiserror::Error;

pub use energy::EnergyKernel;
pub use flags::{Exclusion, KernelFlags, PairPolicy};
pub use force::ForceKernel;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("At most one exclusion flag may be set, got {0}")]
    ConflictingExclusions(KernelFlags),

    #[error("No potential parameters for atom type '{atom_type}'")]
    MissingParameters { atom_type: String },

    #[error("Atom index {index} is out of range for a configuration of {n_atoms} atoms")]
    AtomOutOfRange { index: usize, n_atoms: usize },

    #[error("Collective operation failed: {0}")]
    Pool(#[from] PoolError),
}

/// Options of a whole-configuration total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairSum {
    pub strategy: DivisionStrategy,
    /// Whether pairs of atoms in the same molecule contribute.
    pub include_intramolecular: bool,
}

impl Default for PairSum {
    fn default() -> Self {
        Self {
            strategy: DivisionStrategy::Pool,
            include_intramolecular: true,
        }
    }
}

impl PairSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: DivisionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Only count pairs of atoms in different molecules.
    pub fn intermolecular_only(mut self) -> Self {
        self.include_intramolecular = false;
        self
    }

    #[inline]
    pub(crate) fn counts(&self, i: &Atom, j: &Atom) -> bool {
        self.include_intramolecular || !i.same_molecule(j)
    }
}
