use super::nodes::{self, NodeValue, SelectState};
use super::{ExecutionOutcome, Node, NodeId, NodeKind, NodeRecord, NodeState};
use crate::core::data::Histogram1D;
use crate::engine::context::ExecutionContext;
use crate::engine::error::EngineError;
use slotmap::{SecondaryMap, SlotMap};
use tracing::{trace, warn};

/// Drives one run of a validated procedure and holds the values its nodes exchange.
pub(super) struct Runner<'p> {
    nodes: &'p SlotMap<NodeId, Node>,
    records: &'p mut SecondaryMap<NodeId, NodeRecord>,
    values: SecondaryMap<NodeId, NodeValue>,
}

impl<'p> Runner<'p> {
    pub(super) fn new(
        nodes: &'p SlotMap<NodeId, Node>,
        records: &'p mut SecondaryMap<NodeId, NodeRecord>,
    ) -> Self {
        Self {
            nodes,
            records,
            values: SecondaryMap::new(),
        }
    }

    /// Prepares every node in `order`, executes `root` if all prepares succeeded, then
    /// finalizes the prepared nodes in reverse order. The first error is returned.
    pub(super) fn run(
        &mut self,
        root: NodeId,
        order: &[NodeId],
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<(), EngineError> {
        let mut prepared = Vec::with_capacity(order.len());
        let mut result = Ok(());

        for &id in order {
            let node = self.node(id)?;
            match nodes::prepare(self, id, &node.kind, ctx) {
                Ok(()) => {
                    self.set_state(id, NodeState::Prepared);
                    prepared.push(id);
                }
                Err(e) => {
                    result = Err(e.in_node(&node.name));
                    break;
                }
            }
        }

        if result.is_ok() {
            result = self.execute(root, ctx);
        }

        for &id in prepared.iter().rev() {
            let node = self.node(id)?;
            match nodes::finalize(self, id, &node.kind, ctx) {
                Ok(()) => self.set_state(id, NodeState::Finalized),
                Err(e) => {
                    let e = e.in_node(&node.name);
                    if result.is_ok() {
                        result = Err(e);
                    } else {
                        warn!(error = %e, "Finalize failed after an earlier error.");
                    }
                }
            }
        }
        result
    }

    /// Executes one node, recording the outcome. Sequences run their children in order
    /// and stop at the first failure.
    pub(super) fn execute(
        &mut self,
        id: NodeId,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<(), EngineError> {
        let node = self.node(id)?;
        trace!(node = %node.name, "Executing node.");
        let result = match &node.kind {
            NodeKind::Sequence => node
                .children
                .iter()
                .try_for_each(|&child| self.execute(child, ctx)),
            kind => nodes::execute(self, id, kind, ctx),
        };

        let outcome = match result {
            Ok(()) => ExecutionOutcome::Success,
            Err(_) => ExecutionOutcome::Failure,
        };
        if let Some(record) = self.records.get_mut(id) {
            record.executions += 1;
            record.last_outcome = Some(outcome);
            record.state = NodeState::Executed(outcome);
        }
        result.map_err(|e| e.in_node(&node.name))
    }

    pub(super) fn node(&self, id: NodeId) -> Result<&'p Node, EngineError> {
        let nodes = self.nodes;
        nodes
            .get(id)
            .ok_or_else(|| EngineError::Internal(format!("node {:?} is not in the arena", id)))
    }

    pub(super) fn node_name(&self, id: NodeId) -> &'p str {
        let nodes = self.nodes;
        nodes.get(id).map_or("<unknown>", |node| node.name.as_str())
    }

    fn set_state(&mut self, id: NodeId, state: NodeState) {
        if let Some(record) = self.records.get_mut(id) {
            record.state = state;
        }
    }

    pub(super) fn set_value(&mut self, id: NodeId, value: NodeValue) {
        self.values.insert(id, value);
    }

    pub(super) fn select_state(&self, id: NodeId) -> Result<&SelectState, EngineError> {
        match self.values.get(id) {
            Some(NodeValue::Select(state)) => Ok(state),
            _ => Err(missing(self.node_name(id), "selection")),
        }
    }

    pub(super) fn select_state_mut(&mut self, id: NodeId) -> Result<&mut SelectState, EngineError> {
        let name = self.node_name(id);
        match self.values.get_mut(id) {
            Some(NodeValue::Select(state)) => Ok(state),
            _ => Err(missing(name, "selection")),
        }
    }

    /// Atom index of the site currently selected by the Select node `id`.
    pub(super) fn current_site(&self, id: NodeId) -> Result<usize, EngineError> {
        self.select_state(id)?.current.ok_or_else(|| {
            EngineError::InvalidState(format!(
                "select node '{}' has no current site",
                self.node_name(id)
            ))
        })
    }

    pub(super) fn observable(&self, id: NodeId) -> Result<f64, EngineError> {
        match self.values.get(id) {
            Some(NodeValue::Observable(value)) => Ok(*value),
            _ => Err(missing(self.node_name(id), "observable")),
        }
    }

    pub(super) fn histogram(&self, id: NodeId) -> Result<&Histogram1D, EngineError> {
        match self.values.get(id) {
            Some(NodeValue::Histogram(histogram)) => Ok(histogram),
            _ => Err(missing(self.node_name(id), "histogram")),
        }
    }

    pub(super) fn histogram_mut(&mut self, id: NodeId) -> Result<&mut Histogram1D, EngineError> {
        let name = self.node_name(id);
        match self.values.get_mut(id) {
            Some(NodeValue::Histogram(histogram)) => Ok(histogram),
            _ => Err(missing(name, "histogram")),
        }
    }
}

fn missing(node: &str, what: &str) -> EngineError {
    EngineError::InvalidState(format!("node '{}' has not produced a {} yet", node, what))
}
