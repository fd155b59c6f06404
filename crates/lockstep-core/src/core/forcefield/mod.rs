//! # Force Field Module
//!
//! The boundary between the execution core and an external forcefield. The core never
//! parses parameter files; it receives a [`params::PotentialMap`] describing, for each atom
//! type, a charge and an opaque short-range functional form. Kernels evaluate pair
//! contributions through [`params::PotentialMap::pair_energy`] and
//! [`params::PotentialMap::pair_force`].
//!
//! ## Key Components
//!
//! - [`params`] - Atom type parameters, functional forms and mixing rules
//! - [`potentials`] - Pure analytic potentials and their radial derivatives
//! - [`term`] - Energy decomposition into short-range and electrostatic parts

pub mod params;
pub mod potentials;
pub mod term;
