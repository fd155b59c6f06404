//! # Models Module
//!
//! Data structures describing the subject of a computation: a [`configuration::Configuration`]
//! of atoms grouped into molecules inside a [`cell::PeriodicBox`].
//!
//! Atoms are addressed by their global index within the configuration, which is what the
//! interaction kernels use for their `i >= j` exclusion rules. Molecules and configurations
//! are addressed by `slotmap` keys defined in [`ids`].

pub mod atom;
pub mod cell;
pub mod configuration;
pub mod ids;
pub mod molecule;
