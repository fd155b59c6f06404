use super::{Module, ModuleCategory, ModuleContext, TargetPolicy};
use crate::core::kernel::{ForceKernel, KernelFlags, PairSum};
use crate::engine::error::EngineError;
use crate::engine::keywords::{KeywordList, KeywordValue};
use tracing::{debug, info, instrument, warn};

/// Per-atom forces of each target.
///
/// Stores `<cfg>//Forces` (`Vec<[f64; 3]>`, indexed by atom) and `<cfg>//MaxForce`
/// (`f64`, the largest force magnitude) in the module scope.
#[derive(Debug, Clone)]
pub struct ForcesModule {
    keywords: KeywordList,
}

impl Default for ForcesModule {
    fn default() -> Self {
        let mut keywords = KeywordList::new();
        keywords
            .define(
                "Test",
                "Check the distributed forces against a serial per-atom evaluation",
                KeywordValue::Bool(false),
            )
            .define(
                "TestThreshold",
                "Largest absolute force deviation at which the test comparison fails",
                KeywordValue::Double(1.0e-2),
            );
        Self { keywords }
    }
}

impl ForcesModule {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Module for ForcesModule {
    fn type_name(&self) -> &'static str {
        "Forces"
    }

    fn category(&self) -> ModuleCategory {
        ModuleCategory::Forcefield
    }

    fn brief(&self) -> &'static str {
        "Calculate the atomic forces in a configuration"
    }

    fn target_policy(&self) -> TargetPolicy {
        TargetPolicy::OneOrMore
    }

    fn keywords(&self) -> &KeywordList {
        &self.keywords
    }

    fn keywords_mut(&mut self) -> &mut KeywordList {
        &mut self.keywords
    }

    fn create_instance(&self) -> Box<dyn Module> {
        Box::new(ForcesModule::new())
    }

    #[instrument(skip_all, name = "forces_module")]
    fn run(&mut self, ctx: &mut ModuleContext<'_>) -> Result<(), EngineError> {
        let test = self.keywords.get_bool("Test")?;
        let test_threshold = self.keywords.get_double("TestThreshold")?;

        for target in ctx.targets.iter() {
            let kernel = ForceKernel::new(target, ctx.potentials)?;
            let forces = kernel.total_forces(ctx.pool, PairSum::new())?;

            if test {
                let flags = if target.periodic_box().is_periodic() {
                    KernelFlags::EXCLUDE_SELF | KernelFlags::APPLY_MINIMUM_IMAGE
                } else {
                    KernelFlags::EXCLUDE_SELF
                };
                let mut deviation: f64 = 0.0;
                for atom in target.atoms() {
                    let reference = kernel.atom_force(atom, target.atoms(), flags)?;
                    deviation = deviation.max((reference - forces[atom.index()]).amax());
                }
                if deviation > test_threshold {
                    warn!(deviation, "Force test failed.");
                    return Err(EngineError::TestFailed {
                        quantity: format!("forces of '{}'", target.name()),
                        deviation,
                        threshold: test_threshold,
                    });
                }
                debug!(deviation, "Force test passed.");
            }

            let max_force = forces.iter().map(|f| f.norm()).fold(0.0, f64::max);
            let stored: Vec<[f64; 3]> = forces.iter().map(|f| [f.x, f.y, f.z]).collect();
            ctx.items
                .insert(&format!("{}//Forces", target.name()), &ctx.scope, stored)?;
            ctx.items
                .insert(&format!("{}//MaxForce", target.name()), &ctx.scope, max_force)?;

            info!(
                configuration = target.name(),
                n_atoms = forces.len(),
                max_force,
                "Forces calculated."
            );
        }
        Ok(())
    }
}
