use super::super::NodeId;
use super::super::runner::Runner;
use super::NodeValue;
use crate::engine::context::ExecutionContext;
use crate::engine::error::EngineError;

pub(super) fn execute(
    runner: &mut Runner<'_>,
    id: NodeId,
    i: NodeId,
    j: NodeId,
    ctx: &mut ExecutionContext<'_>,
) -> Result<(), EngineError> {
    let (site_i, site_j) = (runner.current_site(i)?, runner.current_site(j)?);
    let configuration = ctx.configuration()?;
    let position = |index: usize| {
        configuration
            .atom(index)
            .map(|atom| atom.position)
            .ok_or_else(|| {
                EngineError::InvalidState(format!(
                    "site {} is not an atom of configuration '{}'",
                    index,
                    configuration.name()
                ))
            })
    };
    let distance = configuration
        .periodic_box()
        .minimum_distance(&position(site_i)?, &position(site_j)?);
    runner.set_value(id, NodeValue::Observable(distance));
    Ok(())
}
