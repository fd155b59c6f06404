//! # Procedure Module
//!
//! A procedure is an ordered, possibly nested sequence of typed nodes executed under an
//! [`ExecutionContext`]. All nodes live in an arena owned by the procedure and refer to one
//! another by [`NodeId`] only.
//!
//! ## Lifecycle
//!
//! Every run of a procedure drives its nodes through the same states:
//!
//! 1. **Check** - Structural validation: context legality, parameter sanity and references
//!    that exist, have the right kind and are reachable from the referring node.
//! 2. **Prepare** - Per-node setup in execution order. A failure aborts the run.
//! 3. **Execute** - The root sequence runs its children in order and stops at the first
//!    failure, which is propagated naming the innermost failing node.
//! 4. **Finalize** - Attempted for every node whose prepare succeeded, in reverse order,
//!    whether or not execution succeeded.
//!
//! Values produced during a run (current sites, observables, histograms) are held in a
//! side table keyed by [`NodeId`] and discarded when the run ends; results that outlive
//! the run are written to the item store.

pub mod node;
mod nodes;
mod runner;

use super::context::{ExecutionContext, NodeContext};
use super::error::EngineError;
use runner::Runner;
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use std::fmt;
use tracing::{debug, instrument, warn};

pub use node::{Node, NodeKind, NodeType, Normalisation, Reference, ReferenceScope, SelectNode};

new_key_type! {
    pub struct NodeId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unvalidated,
    Validated,
    Prepared,
    Executed(ExecutionOutcome),
    Finalized,
}

/// Lifecycle bookkeeping of one node, kept across runs for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    pub state: NodeState,
    /// Number of times the node was executed during the last run.
    pub executions: u64,
    /// Outcome of the node's most recent execution in the last run.
    pub last_outcome: Option<ExecutionOutcome>,
}

impl Default for NodeRecord {
    fn default() -> Self {
        Self {
            state: NodeState::Unvalidated,
            executions: 0,
            last_outcome: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub node: String,
    pub message: String,
}

/// Problems found by [`Procedure::check`]. An empty report means the procedure is valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub procedure: String,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues_for(&self, node: &str) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |issue| issue.node == node)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "procedure '{}'", self.procedure)?;
        for issue in &self.issues {
            write!(f, "\n  - [{}] {}", issue.node, issue.message)?;
        }
        Ok(())
    }
}

/// An arena of nodes below a root sequence, restricted to one [`NodeContext`].
#[derive(Debug, Clone)]
pub struct Procedure {
    name: String,
    context: NodeContext,
    nodes: SlotMap<NodeId, Node>,
    records: SecondaryMap<NodeId, NodeRecord>,
    root: NodeId,
}

impl Procedure {
    pub fn new(name: impl Into<String>, context: NodeContext) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new("Root".to_string(), NodeKind::Sequence, None));
        let mut records = SecondaryMap::new();
        records.insert(root, NodeRecord::default());
        Self {
            name: name.into(),
            context,
            nodes,
            records,
            root,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> NodeContext {
        self.context
    }

    /// The root sequence.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, node)| node.name == name)
            .map(|(id, _)| id)
    }

    /// Nested sequence owned by `id`, such as the for-each branch of a Select node.
    pub fn branch(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|node| node.branch)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn record(&self, id: NodeId) -> Option<&NodeRecord> {
        self.records.get(id)
    }

    /// Appends a node to the sequence `parent`.
    ///
    /// Nodes whose type owns a branch get an empty sequence named `<name>.ForEach`,
    /// reachable through [`Procedure::branch`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] if `parent` is not a sequence of this procedure
    /// or if the name is already used.
    pub fn add(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        kind: NodeKind,
    ) -> Result<NodeId, EngineError> {
        let name = name.into();
        match self.nodes.get(parent) {
            Some(node) if node.node_type() == NodeType::Sequence => {}
            Some(node) => {
                return Err(EngineError::InvalidState(format!(
                    "node '{}' is a {} node and cannot hold children",
                    node.name,
                    node.node_type()
                )));
            }
            None => {
                return Err(EngineError::InvalidState(format!(
                    "parent of node '{}' does not belong to procedure '{}'",
                    name, self.name
                )));
            }
        }

        let branch_name = format!("{}.ForEach", name);
        let has_branch = kind.node_type().has_branch();
        if self.find(&name).is_some() || (has_branch && self.find(&branch_name).is_some()) {
            return Err(EngineError::InvalidState(format!(
                "a node named '{}' already exists in procedure '{}'",
                name, self.name
            )));
        }

        let id = self.nodes.insert(Node::new(name, kind, Some(parent)));
        self.records.insert(id, NodeRecord::default());
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.push(id);
        }

        if has_branch {
            let branch = self
                .nodes
                .insert(Node::new(branch_name, NodeKind::Sequence, Some(id)));
            self.records.insert(branch, NodeRecord::default());
            if let Some(node) = self.nodes.get_mut(id) {
                node.branch = Some(branch);
            }
        }
        Ok(id)
    }

    /// Every node in execution order: a node, then its branch, then its children.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            order.push(id);
            stack.extend(node.children.iter().rev());
            if let Some(branch) = node.branch {
                stack.push(branch);
            }
        }
        order
    }

    /// Whether `target` is a strict ancestor of `from`.
    pub fn is_ancestor(&self, from: NodeId, target: NodeId) -> bool {
        let mut current = from;
        while let Some(parent) = self.nodes.get(current).and_then(|node| node.parent) {
            if parent == target {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Whether `target` is an ancestor of `from`, or an earlier sibling of `from` or of
    /// one of its ancestors.
    pub fn in_scope(&self, from: NodeId, target: NodeId) -> bool {
        let mut current = from;
        while let Some(parent) = self.nodes.get(current).and_then(|node| node.parent) {
            if parent == target {
                return true;
            }
            if let Some(siblings) = self.nodes.get(parent).map(|node| &node.children) {
                if let Some(position) = siblings.iter().position(|&id| id == current) {
                    if siblings[..position].contains(&target) {
                        return true;
                    }
                }
            }
            current = parent;
        }
        false
    }

    /// Validates the structure of the procedure against its context.
    ///
    /// Nodes are marked validated when the report is empty and unvalidated otherwise.
    pub fn check(&mut self) -> ValidationReport {
        let order = self.preorder();
        let position = |id: NodeId| order.iter().position(|&n| n == id);
        let mut issues = Vec::new();

        for (index, &id) in order.iter().enumerate() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let mut report = |message: String| {
                issues.push(ValidationIssue {
                    node: node.name.clone(),
                    message,
                })
            };

            let node_type = node.node_type();
            if !node_type.legal_contexts().contains(self.context) {
                report(format!(
                    "{} nodes are not allowed in the {} context",
                    node_type, self.context
                ));
            }

            for message in node.kind.parameter_issues() {
                report(message);
            }

            for reference in node.kind.references() {
                let Some(target) = self.nodes.get(reference.target) else {
                    report(format!("{} refers to a node that does not exist", reference.role));
                    continue;
                };
                if target.node_type() != reference.expected {
                    report(format!(
                        "{} must refer to a {} node, but '{}' is a {} node",
                        reference.role,
                        reference.expected,
                        target.name,
                        target.node_type()
                    ));
                }
                let reachable = match reference.scope {
                    ReferenceScope::Ancestor => self.is_ancestor(id, reference.target),
                    ReferenceScope::InScope => self.in_scope(id, reference.target),
                    ReferenceScope::Preceding => {
                        position(reference.target).is_some_and(|p| p < index)
                    }
                };
                if !reachable {
                    report(format!(
                        "{} refers to '{}', which is not in scope",
                        reference.role, target.name
                    ));
                }
            }
        }

        let report = ValidationReport {
            procedure: self.name.clone(),
            issues,
        };
        let state = if report.is_ok() {
            NodeState::Validated
        } else {
            NodeState::Unvalidated
        };
        for (_, record) in self.records.iter_mut() {
            *record = NodeRecord {
                state,
                ..NodeRecord::default()
            };
        }
        report
    }

    /// Checks, prepares, executes and finalizes the procedure under `ctx`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::ContextMismatch`] if `ctx` is not in this procedure's context.
    /// - [`EngineError::Validation`] if [`Procedure::check`] reports any issue; no node runs.
    /// - [`EngineError::NodeFailed`] naming the innermost node whose prepare, execute or
    ///   finalize failed.
    #[instrument(skip_all, name = "procedure", fields(procedure = %self.name))]
    pub fn run(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
        if ctx.node_context() != self.context {
            return Err(EngineError::ContextMismatch {
                procedure: self.name.clone(),
                context: ctx.node_context(),
            });
        }

        let report = self.check();
        if !report.is_ok() {
            warn!(
                issues = report.issues.len(),
                "Procedure failed validation and will not run."
            );
            return Err(EngineError::Validation(report));
        }

        let order = self.preorder();
        debug!(nodes = order.len(), "Running procedure.");
        let mut runner = Runner::new(&self.nodes, &mut self.records);
        runner.run(self.root, &order, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::{Data1D, Histogram1D};
    use crate::core::items::{ItemStore, Scope};
    use crate::core::models::cell::PeriodicBox;
    use crate::core::models::configuration::Configuration;
    use crate::core::models::molecule::MoleculeTemplate;
    use crate::core::pool::SerialPool;
    use nalgebra::{Point3, Vector3};

    fn parameters(name: &str, value: f64) -> NodeKind {
        NodeKind::Parameters {
            values: vec![(name.to_string(), value)],
        }
    }

    fn cubic_box(length: f64) -> NodeKind {
        NodeKind::Box {
            lengths: Vector3::repeat(length),
        }
    }

    fn argon_lattice(n: usize, spacing: f64) -> Configuration {
        let template = MoleculeTemplate::new("Argon").with_atom("Ar", Vector3::zeros());
        let mut cfg = Configuration::new("lattice");
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

    #[test]
    fn add_rejects_duplicate_names_and_non_sequence_parents() {
        let mut procedure = Procedure::new("gen", NodeContext::Generation);
        let root = procedure.root();
        let params = procedure.add(root, "Params", parameters("a", 1.0)).unwrap();
        assert!(matches!(
            procedure.add(root, "Params", parameters("b", 1.0)),
            Err(EngineError::InvalidState(_))
        ));
        assert!(matches!(
            procedure.add(params, "Child", parameters("c", 1.0)),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn select_nodes_own_a_for_each_branch() {
        let mut procedure = Procedure::new("rdf", NodeContext::Analysis);
        let select = procedure
            .add(procedure.root(), "A", NodeKind::Select(SelectNode::new("Ar")))
            .unwrap();
        let branch = procedure.branch(select).unwrap();
        assert_eq!(procedure.node(branch).unwrap().name, "A.ForEach");
        assert_eq!(procedure.node(branch).unwrap().parent(), Some(select));
        assert_eq!(procedure.preorder(), vec![procedure.root(), select, branch]);
    }

    #[test]
    fn node_outside_its_context_fails_check_and_never_executes() {
        let mut procedure = Procedure::new("analysis", NodeContext::Analysis);
        let root = procedure.root();
        let params = procedure.add(root, "Params", parameters("x", 2.0)).unwrap();
        let boxed = procedure.add(root, "Box", cubic_box(10.0)).unwrap();

        let report = procedure.check();
        assert!(!report.is_ok());
        assert_eq!(report.issues_for("Box").count(), 1);
        assert_eq!(report.issues_for("Params").count(), 0);

        let mut items = ItemStore::new();
        let mut cfg = Configuration::new("bulk");
        let mut ctx =
            ExecutionContext::new(&SerialPool, &mut items, NodeContext::Analysis, Scope::Global)
                .with_configuration(&mut cfg);
        assert!(matches!(
            procedure.run(&mut ctx),
            Err(EngineError::Validation(_))
        ));
        assert_eq!(procedure.record(boxed).unwrap().executions, 0);
        assert_eq!(procedure.record(params).unwrap().state, NodeState::Unvalidated);
        assert!(!items.contains("x", &Scope::Global));
        assert!(!cfg.periodic_box().is_periodic());
    }

    #[test]
    fn run_in_the_wrong_context_is_rejected() {
        let mut procedure = Procedure::new("gen", NodeContext::Generation);
        let mut items = ItemStore::new();
        let mut ctx =
            ExecutionContext::new(&SerialPool, &mut items, NodeContext::Analysis, Scope::Global);
        assert!(matches!(
            procedure.run(&mut ctx),
            Err(EngineError::ContextMismatch { .. })
        ));
    }

    #[test]
    fn sequence_stops_at_the_first_failure_and_finalizes_every_prepared_node() {
        let mut procedure = Procedure::new("gen", NodeContext::Generation);
        let root = procedure.root();
        let a = procedure.add(root, "A", parameters("a", 1.0)).unwrap();
        let b = procedure.add(root, "B", cubic_box(10.0)).unwrap();
        let c = procedure.add(root, "C", parameters("c", 3.0)).unwrap();

        // No configuration is bound, so the Box node fails when executed.
        let mut items = ItemStore::new();
        let mut ctx = ExecutionContext::new(
            &SerialPool,
            &mut items,
            NodeContext::Generation,
            Scope::Global,
        );
        match procedure.run(&mut ctx) {
            Err(EngineError::NodeFailed { node, source }) => {
                assert_eq!(node, "B");
                assert!(matches!(*source, EngineError::NotSet("configuration")));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        assert_eq!(procedure.record(a).unwrap().executions, 1);
        assert_eq!(
            procedure.record(b).unwrap().last_outcome,
            Some(ExecutionOutcome::Failure)
        );
        assert_eq!(procedure.record(c).unwrap().executions, 0);
        assert_eq!(
            procedure.record(root).unwrap().last_outcome,
            Some(ExecutionOutcome::Failure)
        );
        for id in [root, a, b, c] {
            assert_eq!(procedure.record(id).unwrap().state, NodeState::Finalized);
        }
    }

    #[test]
    fn failed_prepare_aborts_execution_and_finalizes_earlier_nodes_only() {
        let mut procedure = Procedure::new("gen", NodeContext::Generation);
        let root = procedure.root();
        let a = procedure.add(root, "A", parameters("a", 1.0)).unwrap();
        let b = procedure.add(root, "B", parameters("clash", 2.0)).unwrap();
        let c = procedure.add(root, "C", parameters("c", 3.0)).unwrap();

        let mut items = ItemStore::new();
        items
            .insert("clash", &Scope::Global, "not a number".to_string())
            .unwrap();
        let mut ctx = ExecutionContext::new(
            &SerialPool,
            &mut items,
            NodeContext::Generation,
            Scope::Global,
        );
        match procedure.run(&mut ctx) {
            Err(EngineError::NodeFailed { node, .. }) => assert_eq!(node, "B"),
            other => panic!("unexpected result: {:?}", other),
        }

        assert_eq!(procedure.record(root).unwrap().state, NodeState::Finalized);
        assert_eq!(procedure.record(a).unwrap().state, NodeState::Finalized);
        assert_eq!(procedure.record(b).unwrap().state, NodeState::Validated);
        assert_eq!(procedure.record(c).unwrap().state, NodeState::Validated);
        assert_eq!(procedure.record(a).unwrap().executions, 0);
    }

    #[test]
    fn generation_procedure_builds_a_configuration() {
        let template = MoleculeTemplate::new("Water")
            .with_atom("OW", Vector3::zeros())
            .with_atom("HW", Vector3::new(0.96, 0.0, 0.0))
            .with_atom("HW", Vector3::new(-0.24, 0.93, 0.0));
        let mut procedure = Procedure::new("gen", NodeContext::Generation);
        let root = procedure.root();
        procedure
            .add(root, "Params", parameters("rho", 0.1))
            .unwrap();
        procedure.add(root, "Box", cubic_box(20.0)).unwrap();
        procedure
            .add(
                root,
                "AddWater",
                NodeKind::Add {
                    template,
                    population: 50,
                    seed: 7,
                },
            )
            .unwrap();

        let build = || {
            let mut procedure = procedure.clone();
            let mut items = ItemStore::new();
            let mut cfg = Configuration::new("water");
            let mut ctx = ExecutionContext::new(
                &SerialPool,
                &mut items,
                NodeContext::Generation,
                Scope::Global,
            )
            .with_configuration(&mut cfg);
            procedure.run(&mut ctx).unwrap();
            assert_eq!(*items.retrieve::<f64>("rho", &Scope::Global).unwrap(), 0.1);
            cfg
        };

        let first = build();
        let second = build();
        assert_eq!(first.n_molecules(), 50);
        assert_eq!(first.n_atoms(), 150);
        assert_eq!(first.periodic_box(), &PeriodicBox::Cubic { length: 20.0 });
        assert!(
            first
                .atoms()
                .iter()
                .all(|a| (0.0..20.0).contains(&a.position.x))
        );
        assert_eq!(first.atoms(), second.atoms(), "seeded placement is reproducible");
    }

    #[test]
    fn references_out_of_scope_or_of_the_wrong_kind_fail_check() {
        let mut procedure = Procedure::new("analysis", NodeContext::Analysis);
        let root = procedure.root();
        let a = procedure
            .add(root, "A", NodeKind::Select(SelectNode::new("Ar")))
            .unwrap();
        let a_branch = procedure.branch(a).unwrap();
        let b = procedure
            .add(a_branch, "B", NodeKind::Select(SelectNode::new("Ar")))
            .unwrap();
        let distance = procedure
            .add(
                procedure.branch(b).unwrap(),
                "Distance",
                NodeKind::CalculateDistance { i: a, j: b },
            )
            .unwrap();
        assert!(procedure.check().is_ok());

        // B lives inside A's branch, so it is not visible from the root sequence.
        procedure
            .add(root, "Late", NodeKind::CalculateDistance { i: a, j: b })
            .unwrap();
        // A Collect1D must observe a Calculate node, not a Select node.
        procedure
            .add(
                a_branch,
                "Wrong",
                NodeKind::Collect1D {
                    observable: a,
                    minimum: 0.0,
                    maximum: 5.0,
                    bin_width: 0.1,
                },
            )
            .unwrap();

        let report = procedure.check();
        // Neither A nor B is running when Late executes.
        assert_eq!(report.issues_for("Late").count(), 2);
        assert_eq!(report.issues_for("Wrong").count(), 1);
        assert_eq!(report.issues_for("Distance").count(), 0);
        assert!(procedure.in_scope(distance, a));
        assert!(!procedure.in_scope(a, distance));
        assert!(procedure.is_ancestor(distance, b));
    }

    #[test]
    fn current_site_of_a_finished_sibling_select_fails_check() {
        let mut procedure = Procedure::new("analysis", NodeContext::Analysis);
        let root = procedure.root();
        let a = procedure
            .add(root, "A", NodeKind::Select(SelectNode::new("Ar")))
            .unwrap();
        let b = procedure
            .add(
                root,
                "B",
                NodeKind::Select(SelectNode::new("Ar").excluding_same_site(a)),
            )
            .unwrap();
        procedure
            .add(
                procedure.branch(b).unwrap(),
                "D",
                NodeKind::CalculateDistance { i: a, j: b },
            )
            .unwrap();

        // A precedes B, but its loop is over by the time B or D runs.
        assert!(procedure.in_scope(b, a));
        let report = procedure.check();
        assert_eq!(report.issues_for("D").count(), 1);
        assert_eq!(report.issues_for("B").count(), 1);

        let mut cfg = argon_lattice(2, 4.0);
        let mut items = ItemStore::new();
        let mut ctx =
            ExecutionContext::new(&SerialPool, &mut items, NodeContext::Analysis, Scope::Global)
                .with_configuration(&mut cfg);
        assert!(matches!(
            procedure.run(&mut ctx),
            Err(EngineError::Validation(_))
        ));
    }

    fn oh_distance_count(select_h: impl Fn(NodeId) -> SelectNode) -> u64 {
        let water = MoleculeTemplate::new("Water")
            .with_atom("OW", Vector3::zeros())
            .with_atom("HW", Vector3::new(1.0, 0.0, 0.0))
            .with_atom("HW", Vector3::new(0.0, 1.0, 0.0));
        let mut cfg = Configuration::new("waters");
        for x in 0..3 {
            cfg.add_molecule(&water, Point3::new(x as f64 * 5.0, 0.0, 0.0));
        }

        let mut procedure = Procedure::new("oh", NodeContext::Analysis);
        let o = procedure
            .add(procedure.root(), "O", NodeKind::Select(SelectNode::new("OW")))
            .unwrap();
        let h = procedure
            .add(procedure.branch(o).unwrap(), "H", NodeKind::Select(select_h(o)))
            .unwrap();
        let distance = procedure
            .add(
                procedure.branch(h).unwrap(),
                "rOH",
                NodeKind::CalculateDistance { i: o, j: h },
            )
            .unwrap();

        let mut items = ItemStore::new();
        let mut ctx =
            ExecutionContext::new(&SerialPool, &mut items, NodeContext::Analysis, Scope::Global)
                .with_configuration(&mut cfg);
        procedure.run(&mut ctx).unwrap();
        procedure.record(distance).unwrap().executions
    }

    #[test]
    fn select_honours_molecule_restrictions() {
        assert_eq!(oh_distance_count(|_| SelectNode::new("HW")), 9 * 2);
        assert_eq!(
            oh_distance_count(|o| SelectNode::new("HW").in_same_molecule_as(o)),
            3 * 2
        );
        assert_eq!(
            oh_distance_count(|o| SelectNode::new("HW").excluding_same_molecule(o)),
            3 * 4
        );
    }

    fn rdf_procedure(range: f64, bin_width: f64) -> Procedure {
        let mut procedure = Procedure::new("rdf", NodeContext::Analysis);
        let root = procedure.root();
        let a = procedure
            .add(root, "A", NodeKind::Select(SelectNode::new("Ar")))
            .unwrap();
        let b = procedure
            .add(
                procedure.branch(a).unwrap(),
                "B",
                NodeKind::Select(SelectNode::new("Ar").excluding_same_site(a)),
            )
            .unwrap();
        let b_branch = procedure.branch(b).unwrap();
        let distance = procedure
            .add(b_branch, "rAB", NodeKind::CalculateDistance { i: a, j: b })
            .unwrap();
        let collect = procedure
            .add(
                b_branch,
                "Histogram",
                NodeKind::Collect1D {
                    observable: distance,
                    minimum: 0.0,
                    maximum: range,
                    bin_width,
                },
            )
            .unwrap();
        procedure
            .add(
                root,
                "RDF",
                NodeKind::Process1D {
                    source: collect,
                    normalisations: vec![
                        Normalisation::SitePopulation(a),
                        Normalisation::NumberDensity(b),
                        Normalisation::SphericalShellVolume,
                    ],
                },
            )
            .unwrap();
        procedure
    }

    #[test]
    fn analysis_procedure_counts_every_ordered_pair_once() {
        let mut procedure = rdf_procedure(6.0, 0.5);
        let mut cfg = argon_lattice(3, 4.0);
        let mut items = ItemStore::new();
        let scope = Scope::module("rdf");
        let mut ctx =
            ExecutionContext::new(&SerialPool, &mut items, NodeContext::Analysis, scope.clone())
                .with_configuration(&mut cfg);
        procedure.run(&mut ctx).unwrap();

        let histogram = items.retrieve::<Histogram1D>("Histogram", &scope).unwrap();
        // 27 sites, each paired with the 26 others. Body diagonals fall beyond the range.
        assert_eq!(histogram.n_binned() + histogram.n_missed(), 27 * 26);

        let b = procedure.find("B").unwrap();
        assert_eq!(procedure.record(b).unwrap().executions, 27);
        let distance = procedure.find("rAB").unwrap();
        assert_eq!(procedure.record(distance).unwrap().executions, 27 * 26);
    }

    #[test]
    fn lattice_rdf_has_no_density_below_the_nearest_neighbour_distance() {
        let mut procedure = rdf_procedure(6.0, 0.1);
        let mut cfg = argon_lattice(4, 4.0);
        let mut items = ItemStore::new();
        let scope = Scope::module("rdf");
        let mut ctx =
            ExecutionContext::new(&SerialPool, &mut items, NodeContext::Analysis, scope.clone())
                .with_configuration(&mut cfg);
        procedure.run(&mut ctx).unwrap();

        let rdf = items.retrieve::<Data1D>("RDF", &scope).unwrap();
        assert_eq!(rdf.len(), 60);
        for (r, g) in rdf.iter() {
            if r < 3.9 {
                assert_eq!(g, 0.0, "unexpected density at r = {}", r);
            }
        }
        let peak = rdf
            .iter()
            .filter(|(r, _)| (3.9..4.1).contains(r))
            .map(|(_, g)| g)
            .sum::<f64>();
        assert!(peak > 0.0);
    }
}
