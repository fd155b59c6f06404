use crate::core::models::cell::PeriodicBox;
use crate::core::models::molecule::MoleculeTemplate;
use crate::engine::context::ExecutionContext;
use crate::engine::error::EngineError;
use nalgebra::{Point3, Vector3};
use rand::prelude::*;
use tracing::debug;

pub(super) fn prepare_parameters(
    values: &[(String, f64)],
    ctx: &mut ExecutionContext<'_>,
) -> Result<(), EngineError> {
    let scope = ctx.scope().clone();
    for (name, value) in values {
        ctx.items_mut().insert(name, &scope, *value)?;
    }
    Ok(())
}

pub(super) fn execute_box(
    lengths: &Vector3<f64>,
    ctx: &mut ExecutionContext<'_>,
) -> Result<(), EngineError> {
    ctx.configuration_mut()?
        .set_box(PeriodicBox::from_lengths(*lengths));
    Ok(())
}

/// Places `population` copies of `template` at uniformly random origins in the box.
///
/// The generator is seeded from the node, so every worker builds the same configuration.
pub(super) fn execute_add(
    template: &MoleculeTemplate,
    population: usize,
    seed: u64,
    ctx: &mut ExecutionContext<'_>,
) -> Result<(), EngineError> {
    let configuration = ctx.configuration_mut()?;
    let lengths = configuration.periodic_box().lengths().ok_or_else(|| {
        EngineError::InvalidState(format!(
            "configuration '{}' has no periodic box to add molecules into",
            configuration.name()
        ))
    })?;

    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..population {
        let origin = Point3::new(
            rng.gen_range(0.0..lengths.x),
            rng.gen_range(0.0..lengths.y),
            rng.gen_range(0.0..lengths.z),
        );
        configuration.add_molecule(template, origin);
    }
    debug!(
        molecule = %template.name,
        population,
        n_atoms = configuration.n_atoms(),
        "Added molecules."
    );
    Ok(())
}
