//! # Workflows Module
//!
//! Top-level entry points that drive a complete simulation: configurations are built by
//! their generation tasks, then the module layer is iterated in lock-step across the
//! workers of a process pool.
//!
//! ## Iteration
//!
//! Every iteration runs the enabled modules of the layer in order, replicates the root
//! worker's item store onto every other worker with a collective broadcast and, if
//! requested, verifies that all stores now agree. A failed collective or a disagreement
//! ends the run with an error on every worker.
//!
//! - **Simulation** ([`simulation`]) - Configurations, generators, module layer and item store

pub mod simulation;

pub use simulation::Simulation;
