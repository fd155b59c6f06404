use super::error::EngineError;
use crate::core::items::{ItemStore, Scope};
use crate::core::models::configuration::Configuration;
use crate::core::pool::ProcessPool;
use std::fmt;

/// Kind of work a procedure performs, which decides the nodes it may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeContext {
    /// Builds or modifies a configuration.
    Generation,
    /// Reads a configuration and produces results.
    Analysis,
}

impl fmt::Display for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeContext::Generation => write!(f, "Generation"),
            NodeContext::Analysis => write!(f, "Analysis"),
        }
    }
}

/// Set of [`NodeContext`]s in which a node kind is legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeContextSet(u8);

impl NodeContextSet {
    pub const GENERATION: NodeContextSet = NodeContextSet(1);
    pub const ANALYSIS: NodeContextSet = NodeContextSet(2);
    pub const ALL: NodeContextSet = NodeContextSet(3);

    pub fn contains(self, context: NodeContext) -> bool {
        let bit = match context {
            NodeContext::Generation => Self::GENERATION.0,
            NodeContext::Analysis => Self::ANALYSIS.0,
        };
        self.0 & bit != 0
    }
}

/// References available to one node or module invocation.
///
/// The context only borrows: it cannot outlive the pool, configuration and item store it
/// was built from, and its bindings are fixed once constructed.
pub struct ExecutionContext<'a> {
    pool: &'a dyn ProcessPool,
    configuration: Option<&'a mut Configuration>,
    items: &'a mut ItemStore,
    node_context: NodeContext,
    scope: Scope,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        pool: &'a dyn ProcessPool,
        items: &'a mut ItemStore,
        node_context: NodeContext,
        scope: Scope,
    ) -> Self {
        Self {
            pool,
            configuration: None,
            items,
            node_context,
            scope,
        }
    }

    /// Binds the target configuration. Intended to be chained onto [`ExecutionContext::new`].
    pub fn with_configuration(mut self, configuration: &'a mut Configuration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    #[inline]
    pub fn pool(&self) -> &'a dyn ProcessPool {
        self.pool
    }

    /// The target configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotSet`] if no configuration is bound.
    pub fn configuration(&self) -> Result<&Configuration, EngineError> {
        self.configuration
            .as_deref()
            .ok_or(EngineError::NotSet("configuration"))
    }

    pub fn configuration_mut(&mut self) -> Result<&mut Configuration, EngineError> {
        self.configuration
            .as_deref_mut()
            .ok_or(EngineError::NotSet("configuration"))
    }

    pub fn has_configuration(&self) -> bool {
        self.configuration.is_some()
    }

    #[inline]
    pub fn items(&self) -> &ItemStore {
        self.items
    }

    #[inline]
    pub fn items_mut(&mut self) -> &mut ItemStore {
        self.items
    }

    #[inline]
    pub fn node_context(&self) -> NodeContext {
        self.node_context
    }

    /// Scope under which items written through this context are stored.
    #[inline]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pool::SerialPool;

    #[test]
    fn missing_configuration_is_reported_as_not_set() {
        let mut items = ItemStore::new();
        let mut ctx =
            ExecutionContext::new(&SerialPool, &mut items, NodeContext::Analysis, Scope::Global);
        assert!(!ctx.has_configuration());
        assert!(matches!(
            ctx.configuration(),
            Err(EngineError::NotSet("configuration"))
        ));
        assert!(matches!(
            ctx.configuration_mut(),
            Err(EngineError::NotSet("configuration"))
        ));
    }

    #[test]
    fn bound_configuration_and_items_are_reachable() {
        let mut items = ItemStore::new();
        let mut cfg = Configuration::new("bulk");
        let mut ctx = ExecutionContext::new(
            &SerialPool,
            &mut items,
            NodeContext::Generation,
            Scope::module("gen"),
        )
        .with_configuration(&mut cfg);

        assert_eq!(ctx.configuration().unwrap().name(), "bulk");
        ctx.items_mut()
            .insert("x", &Scope::module("gen"), 1.0_f64)
            .unwrap();
        assert!(ctx.items().contains("x", ctx.scope()));
        assert_eq!(ctx.node_context(), NodeContext::Generation);
        assert_eq!(ctx.pool().n_processes(), 1);
    }

    #[test]
    fn context_sets_contain_expected_contexts() {
        assert!(NodeContextSet::ALL.contains(NodeContext::Generation));
        assert!(NodeContextSet::ALL.contains(NodeContext::Analysis));
        assert!(!NodeContextSet::GENERATION.contains(NodeContext::Analysis));
        assert!(!NodeContextSet::ANALYSIS.contains(NodeContext::Generation));
    }
}
