use super::NodeId;
use crate::engine::context::NodeContextSet;
use crate::core::models::molecule::MoleculeTemplate;
use nalgebra::Vector3;
use std::fmt;

/// Tag identifying the kind of a node, independent of its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Sequence,
    Parameters,
    Box,
    Add,
    Select,
    CalculateDistance,
    Collect1D,
    Process1D,
}

impl NodeType {
    /// Contexts in which nodes of this type may be placed.
    pub fn legal_contexts(self) -> NodeContextSet {
        match self {
            NodeType::Sequence | NodeType::Parameters => NodeContextSet::ALL,
            NodeType::Box | NodeType::Add => NodeContextSet::GENERATION,
            NodeType::Select
            | NodeType::CalculateDistance
            | NodeType::Collect1D
            | NodeType::Process1D => NodeContextSet::ANALYSIS,
        }
    }

    /// Whether nodes of this type own a nested sequence executed for each of their items.
    pub fn has_branch(self) -> bool {
        matches!(self, NodeType::Select)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a node may reach the node it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceScope {
    /// A strict ancestor. Required wherever the referring node reads the target's current
    /// site, which only exists while the target is running its branch.
    Ancestor,
    /// An ancestor, or an earlier sibling of the node or of one of its ancestors.
    InScope,
    /// Any node that comes earlier in execution order.
    Preceding,
}

/// A reference from one node to another, as declared by the referring node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub role: &'static str,
    pub target: NodeId,
    pub expected: NodeType,
    pub scope: ReferenceScope,
}

/// Normalisation applied by a [`NodeKind::Process1D`] node, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalisation {
    /// Divide by the average number of sites selected by a Select node.
    SitePopulation(NodeId),
    /// Divide each bin by the volume of its spherical shell.
    SphericalShellVolume,
    /// Divide by the number density of a Select node's sites in the configuration box.
    NumberDensity(NodeId),
    /// Divide by a constant.
    Factor(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectNode {
    /// Atom type whose atoms are the candidate sites.
    pub atom_type: String,
    /// Skip a site if it is the current site of any of these Select nodes.
    pub exclude_same_site: Vec<NodeId>,
    /// Skip a site if it shares a molecule with the current site of any of these Select nodes.
    pub exclude_same_molecule: Vec<NodeId>,
    /// Only accept sites in the same molecule as the current site of this Select node.
    pub same_molecule_as: Option<NodeId>,
}

impl SelectNode {
    pub fn new(atom_type: impl Into<String>) -> Self {
        Self {
            atom_type: atom_type.into(),
            exclude_same_site: Vec::new(),
            exclude_same_molecule: Vec::new(),
            same_molecule_as: None,
        }
    }

    pub fn excluding_same_site(mut self, node: NodeId) -> Self {
        self.exclude_same_site.push(node);
        self
    }

    pub fn excluding_same_molecule(mut self, node: NodeId) -> Self {
        self.exclude_same_molecule.push(node);
        self
    }

    pub fn in_same_molecule_as(mut self, node: NodeId) -> Self {
        self.same_molecule_as = Some(node);
        self
    }
}

/// The closed set of node kinds with their parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Runs its children in order, stopping at the first failure.
    Sequence,
    /// Writes named scalar parameters into the item store when prepared.
    Parameters { values: Vec<(String, f64)> },
    /// Sets the periodic box of the target configuration.
    Box { lengths: Vector3<f64> },
    /// Adds copies of a molecule at random positions drawn from a seeded generator.
    Add {
        template: MoleculeTemplate,
        population: usize,
        seed: u64,
    },
    /// Loops over the sites of one atom type, running its branch for each.
    Select(SelectNode),
    /// Minimum-image distance between the current sites of two Select nodes.
    CalculateDistance { i: NodeId, j: NodeId },
    /// Histograms the observable of a Calculate node.
    Collect1D {
        observable: NodeId,
        minimum: f64,
        maximum: f64,
        bin_width: f64,
    },
    /// Normalises the histogram of a Collect1D node into a `Data1D` item.
    Process1D {
        source: NodeId,
        normalisations: Vec<Normalisation>,
    },
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Sequence => NodeType::Sequence,
            NodeKind::Parameters { .. } => NodeType::Parameters,
            NodeKind::Box { .. } => NodeType::Box,
            NodeKind::Add { .. } => NodeType::Add,
            NodeKind::Select(_) => NodeType::Select,
            NodeKind::CalculateDistance { .. } => NodeType::CalculateDistance,
            NodeKind::Collect1D { .. } => NodeType::Collect1D,
            NodeKind::Process1D { .. } => NodeType::Process1D,
        }
    }

    /// Every node this node refers to.
    pub fn references(&self) -> Vec<Reference> {
        let ancestor = |role, target| Reference {
            role,
            target,
            expected: NodeType::Select,
            scope: ReferenceScope::Ancestor,
        };
        let in_scope = |role, target, expected| Reference {
            role,
            target,
            expected,
            scope: ReferenceScope::InScope,
        };
        let preceding = |role, target, expected| Reference {
            role,
            target,
            expected,
            scope: ReferenceScope::Preceding,
        };

        match self {
            NodeKind::Select(select) => select
                .exclude_same_site
                .iter()
                .map(|&id| ancestor("ExcludeSameSite", id))
                .chain(
                    select
                        .exclude_same_molecule
                        .iter()
                        .map(|&id| ancestor("ExcludeSameMolecule", id)),
                )
                .chain(
                    select
                        .same_molecule_as
                        .map(|id| ancestor("SameMoleculeAsSite", id)),
                )
                .collect(),
            NodeKind::CalculateDistance { i, j } => vec![
                ancestor("I", *i),
                ancestor("J", *j),
            ],
            NodeKind::Collect1D { observable, .. } => {
                vec![in_scope("Observable", *observable, NodeType::CalculateDistance)]
            }
            NodeKind::Process1D {
                source,
                normalisations,
            } => std::iter::once(preceding("SourceData", *source, NodeType::Collect1D))
                .chain(normalisations.iter().filter_map(|n| match n {
                    Normalisation::SitePopulation(id) => {
                        Some(preceding("NSites", *id, NodeType::Select))
                    }
                    Normalisation::NumberDensity(id) => {
                        Some(preceding("NumberDensity", *id, NodeType::Select))
                    }
                    Normalisation::SphericalShellVolume | Normalisation::Factor(_) => None,
                }))
                .collect(),
            NodeKind::Sequence
            | NodeKind::Parameters { .. }
            | NodeKind::Box { .. }
            | NodeKind::Add { .. } => Vec::new(),
        }
    }

    /// Structural problems detectable from the node's own parameters.
    pub fn parameter_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        match self {
            NodeKind::Box { lengths } => {
                if lengths.iter().any(|&l| !(l > 0.0)) {
                    issues.push(format!("box lengths must be positive, got {:?}", lengths));
                }
            }
            NodeKind::Add {
                template,
                population,
                ..
            } => {
                if template.is_empty() {
                    issues.push(format!("molecule template '{}' has no atoms", template.name));
                }
                if *population == 0 {
                    issues.push("population must be at least one".to_string());
                }
            }
            NodeKind::Select(select) => {
                if select.atom_type.is_empty() {
                    issues.push("no atom type given for site selection".to_string());
                }
            }
            NodeKind::Collect1D {
                minimum,
                maximum,
                bin_width,
                ..
            } => {
                if !(maximum > minimum) || !(*bin_width > 0.0) {
                    issues.push(format!(
                        "invalid histogram range [{}, {}) with bin width {}",
                        minimum, maximum, bin_width
                    ));
                }
            }
            NodeKind::Process1D { normalisations, .. } => {
                if normalisations
                    .iter()
                    .any(|n| matches!(n, Normalisation::Factor(f) if *f == 0.0))
                {
                    issues.push("normalisation factor must be non-zero".to_string());
                }
            }
            NodeKind::Sequence | NodeKind::Parameters { .. } | NodeKind::CalculateDistance { .. } => {}
        }
        issues
    }
}

/// A node of a procedure, owned by the procedure's arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,
    pub(super) branch: Option<NodeId>,
}

impl Node {
    pub(super) fn new(name: String, kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            name,
            kind,
            parent,
            children: Vec::new(),
            branch: None,
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children of a sequence node, in execution order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The nested sequence of a node that owns one.
    pub fn branch(&self) -> Option<NodeId> {
        self.branch
    }
}
