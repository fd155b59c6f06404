use super::super::NodeId;
use super::super::runner::Runner;
use super::NodeValue;
use crate::core::data::Histogram1D;
use crate::engine::context::ExecutionContext;
use crate::engine::error::EngineError;
use tracing::debug;

/// Realises the histogram item named after the node and zeroes it, re-initialising its
/// bins if the requested layout changed.
pub(super) fn prepare(
    runner: &mut Runner<'_>,
    id: NodeId,
    (minimum, maximum, bin_width): (f64, f64, f64),
    ctx: &mut ExecutionContext<'_>,
) -> Result<(), EngineError> {
    let scope = ctx.scope().clone();
    let histogram = ctx
        .items_mut()
        .realise::<Histogram1D>(runner.node_name(id), &scope)?;
    if histogram.has_layout(minimum, maximum, bin_width) {
        histogram.zero_bins();
    } else {
        histogram.initialise(minimum, maximum, bin_width);
    }
    runner.set_value(id, NodeValue::Histogram(histogram.clone()));
    Ok(())
}

pub(super) fn execute(
    runner: &mut Runner<'_>,
    id: NodeId,
    observable: NodeId,
) -> Result<(), EngineError> {
    let value = runner.observable(observable)?;
    runner.histogram_mut(id)?.bin(value);
    Ok(())
}

/// Commits the accumulated histogram to the item store.
pub(super) fn finalize(
    runner: &mut Runner<'_>,
    id: NodeId,
    ctx: &mut ExecutionContext<'_>,
) -> Result<(), EngineError> {
    let histogram = runner.histogram(id)?.clone();
    debug!(
        node = runner.node_name(id),
        binned = histogram.n_binned(),
        missed = histogram.n_missed(),
        "Committing histogram."
    );
    let scope = ctx.scope().clone();
    ctx.items_mut()
        .insert(runner.node_name(id), &scope, histogram)?;
    Ok(())
}
