use super::super::runner::Runner;
use super::super::{NodeId, Normalisation};
use crate::core::data::Data1D;
use crate::core::models::cell::spherical_shell_volume;
use crate::engine::context::ExecutionContext;
use crate::engine::error::EngineError;

/// Converts the source histogram into a `Data1D` item named after the node, applying the
/// normalisations in order.
pub(super) fn execute(
    runner: &mut Runner<'_>,
    id: NodeId,
    source: NodeId,
    normalisations: &[Normalisation],
    ctx: &mut ExecutionContext<'_>,
) -> Result<(), EngineError> {
    let histogram = runner.histogram(source)?;
    let mut data = Data1D::new(runner.node_name(id));
    for (index, &count) in histogram.bins().iter().enumerate() {
        data.push(histogram.bin_centre(index), count as f64);
    }

    for normalisation in normalisations {
        match *normalisation {
            Normalisation::SitePopulation(select) => {
                let average = runner.select_state(select)?.average_sites();
                data.divide_by(|_| average);
            }
            Normalisation::SphericalShellVolume => {
                data.divide_by(|index| {
                    let lower = histogram.bin_lower_edge(index);
                    spherical_shell_volume(lower, lower + histogram.bin_width())
                });
            }
            Normalisation::NumberDensity(select) => {
                let volume = ctx.configuration()?.periodic_box().volume().ok_or_else(|| {
                    EngineError::InvalidState(
                        "number density normalisation requires a periodic box".to_string(),
                    )
                })?;
                let density = runner.select_state(select)?.average_sites() / volume;
                data.divide_by(|_| density);
            }
            Normalisation::Factor(factor) => data.divide_by(|_| factor),
        }
    }

    let scope = ctx.scope().clone();
    ctx.items_mut().insert(runner.node_name(id), &scope, data)?;
    Ok(())
}
