//! # Modules
//!
//! A module is a self-contained unit of simulation or analysis work. It owns a typed
//! keyword list, declares how many target configurations it needs, and is run once per
//! iteration of the module layer it belongs to.
//!
//! Modules are created from prototypes held by a [`ModuleRegistry`], wired to targets in a
//! [`ModuleLayer`], and store their results in the item store under their own
//! [`Scope::Module`](crate::core::items::Scope::Module).

mod energy;
mod forces;
mod layer;
mod registry;
mod site_rdf;

pub use energy::EnergyModule;
pub use forces::ForcesModule;
pub use layer::{ModuleInstance, ModuleLayer};
pub use registry::ModuleRegistry;
pub use site_rdf::SiteRdfModule;

use super::error::EngineError;
use super::keywords::{KeywordList, KeywordSignal};
use super::progress::ProgressReporter;
use crate::core::forcefield::params::PotentialMap;
use crate::core::items::{ItemStore, Scope};
use crate::core::models::configuration::Configuration;
use crate::core::pool::ProcessPool;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleCategory {
    Forcefield,
    Analysis,
}

impl fmt::Display for ModuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleCategory::Forcefield => write!(f, "Forcefield"),
            ModuleCategory::Analysis => write!(f, "Analysis"),
        }
    }
}

/// Number of target configurations a module accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetPolicy {
    Zero,
    ExactlyOne,
    OneOrMore,
}

impl TargetPolicy {
    pub fn accepts(self, n_targets: usize) -> bool {
        match self {
            TargetPolicy::Zero => n_targets == 0,
            TargetPolicy::ExactlyOne => n_targets == 1,
            TargetPolicy::OneOrMore => n_targets >= 1,
        }
    }
}

impl fmt::Display for TargetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetPolicy::Zero => write!(f, "no targets"),
            TargetPolicy::ExactlyOne => write!(f, "exactly one target"),
            TargetPolicy::OneOrMore => write!(f, "one or more targets"),
        }
    }
}

/// Everything a module may touch during one run.
///
/// Built by the [`ModuleLayer`] for each invocation; `scope` is the module's own scope and
/// `targets` holds the configurations the instance was wired to, in wiring order.
pub struct ModuleContext<'a> {
    pub pool: &'a dyn ProcessPool,
    pub targets: Vec<&'a mut Configuration>,
    pub items: &'a mut ItemStore,
    pub scope: Scope,
    pub potentials: &'a PotentialMap,
    pub reporter: &'a ProgressReporter<'a>,
    /// One-based iteration of the module layer.
    pub iteration: usize,
}

/// The contract every module implements.
pub trait Module: Send {
    /// Registry name of the module type.
    fn type_name(&self) -> &'static str;

    fn category(&self) -> ModuleCategory;

    /// One-line description, shown by the CLI.
    fn brief(&self) -> &'static str;

    fn target_policy(&self) -> TargetPolicy;

    fn keywords(&self) -> &KeywordList;

    fn keywords_mut(&mut self) -> &mut KeywordList;

    /// A fresh instance of the same type with default keywords and no state.
    fn create_instance(&self) -> Box<dyn Module>;

    /// Reacts to a signal raised by one of the module's keywords changing.
    fn handle_signal(&mut self, _signal: KeywordSignal) {}

    /// Performs the module's work on its targets.
    ///
    /// Must be called by every worker of `ctx.pool` in the same order.
    fn run(&mut self, ctx: &mut ModuleContext<'_>) -> Result<(), EngineError>;
}

impl fmt::Debug for dyn Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("type_name", &self.type_name())
            .field("keywords", &self.keywords().len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::core::forcefield::params::{AtomTypeParams, PotentialMap, ShortRangeFunctional};
    use crate::core::models::cell::PeriodicBox;
    use crate::core::models::configuration::Configuration;
    use crate::core::models::molecule::MoleculeTemplate;
    use nalgebra::{Point3, Vector3};

    pub fn argon_potentials() -> PotentialMap {
        PotentialMap::new(8.0).with_type(AtomTypeParams::new(
            "Ar",
            0.0,
            ShortRangeFunctional::LennardJonesGeometric {
                epsilon: 0.238,
                sigma: 3.4,
            },
        ))
    }

    /// Simple cubic lattice of `n`³ argon atoms filling a periodic box.
    pub fn argon_lattice(name: &str, n: usize, spacing: f64) -> Configuration {
        let template = MoleculeTemplate::new("Argon").with_atom("Ar", Vector3::zeros());
        let mut cfg = Configuration::new(name);
        cfg.set_box(PeriodicBox::Cubic {
            length: n as f64 * spacing,
        });
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    cfg.add_molecule(
                        &template,
                        Point3::new(x as f64, y as f64, z as f64) * spacing,
                    );
                }
            }
        }
        cfg
    }
}
