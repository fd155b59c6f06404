//! # Core Module
//!
//! The stateless foundation shared by every worker: the subject of computation, the data
//! store that holds results, and the collectives and kernels that operate on both.
//!
//! ## Architecture
//!
//! - **Data Models** ([`models`]) - Atoms, molecules, periodic boxes and configurations
//! - **Result Data** ([`data`]) - Histograms and one-dimensional data sets
//! - **Item Store** ([`items`]) - Type-erased named results and their cross-worker broadcast
//! - **Process Pool** ([`pool`]) - Ranks, broadcasts, reductions and barriers
//! - **Interaction Kernels** ([`kernel`]) - Pair energies and forces under exclusion flags
//! - **Forcefield Boundary** ([`forcefield`]) - Per-type parameters and analytic potentials
//! - **Utilities** ([`utils`]) - Version counters

pub mod data;
pub mod forcefield;
pub mod items;
pub mod kernel;
pub mod models;
pub mod pool;
pub mod utils;
