//! Per-kind lifecycle behaviour of procedure nodes.

mod calculate;
mod collect;
mod generation;
mod process;
mod select;

use super::runner::Runner;
use super::{NodeId, NodeKind};
use crate::core::data::Histogram1D;
use crate::engine::context::ExecutionContext;
use crate::engine::error::EngineError;

/// Value produced by a node during a run and read by the nodes that refer to it.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum NodeValue {
    Select(SelectState),
    Observable(f64),
    Histogram(Histogram1D),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(super) struct SelectState {
    /// Atom index of the site the for-each branch is currently running for.
    pub current: Option<usize>,
    /// Number of times the node was executed since it was prepared.
    pub n_selections: u64,
    /// Sites visited, summed over all selections.
    pub n_cumulative_sites: u64,
}

impl SelectState {
    /// Mean number of sites per selection.
    pub fn average_sites(&self) -> f64 {
        if self.n_selections == 0 {
            0.0
        } else {
            self.n_cumulative_sites as f64 / self.n_selections as f64
        }
    }
}

pub(super) fn prepare(
    runner: &mut Runner<'_>,
    id: NodeId,
    kind: &NodeKind,
    ctx: &mut ExecutionContext<'_>,
) -> Result<(), EngineError> {
    match kind {
        NodeKind::Parameters { values } => generation::prepare_parameters(values, ctx),
        NodeKind::Select(_) => {
            runner.set_value(id, NodeValue::Select(SelectState::default()));
            Ok(())
        }
        NodeKind::Collect1D {
            minimum,
            maximum,
            bin_width,
            ..
        } => collect::prepare(runner, id, (*minimum, *maximum, *bin_width), ctx),
        NodeKind::Sequence
        | NodeKind::Box { .. }
        | NodeKind::Add { .. }
        | NodeKind::CalculateDistance { .. }
        | NodeKind::Process1D { .. } => Ok(()),
    }
}

pub(super) fn execute(
    runner: &mut Runner<'_>,
    id: NodeId,
    kind: &NodeKind,
    ctx: &mut ExecutionContext<'_>,
) -> Result<(), EngineError> {
    match kind {
        NodeKind::Sequence => Err(EngineError::Internal(
            "sequence dispatched as a leaf node".to_string(),
        )),
        NodeKind::Parameters { .. } => Ok(()),
        NodeKind::Box { lengths } => generation::execute_box(lengths, ctx),
        NodeKind::Add {
            template,
            population,
            seed,
        } => generation::execute_add(template, *population, *seed, ctx),
        NodeKind::Select(select) => select::execute(runner, id, select, ctx),
        NodeKind::CalculateDistance { i, j } => calculate::execute(runner, id, *i, *j, ctx),
        NodeKind::Collect1D { observable, .. } => collect::execute(runner, id, *observable),
        NodeKind::Process1D {
            source,
            normalisations,
        } => process::execute(runner, id, *source, normalisations, ctx),
    }
}

pub(super) fn finalize(
    runner: &mut Runner<'_>,
    id: NodeId,
    kind: &NodeKind,
    ctx: &mut ExecutionContext<'_>,
) -> Result<(), EngineError> {
    match kind {
        NodeKind::Collect1D { .. } => collect::finalize(runner, id, ctx),
        NodeKind::Select(_) => {
            runner.select_state_mut(id)?.current = None;
            Ok(())
        }
        _ => Ok(()),
    }
}
