use thiserror::Error;

use super::context::NodeContext;
use super::keywords::KeywordError;
use super::modules::TargetPolicy;
use super::procedure::ValidationReport;
use crate::core::items::{ItemError, ItemKey};
use crate::core::kernel::KernelError;
use crate::core::models::configuration::ConfigurationError;
use crate::core::pool::PoolError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Item store error: {0}")]
    Item(#[from] ItemError),

    #[error("Process pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Interaction kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("Keyword error: {0}")]
    Keyword(#[from] KeywordError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Required context reference '{0}' is not set")]
    NotSet(&'static str),

    #[error("Procedure validation failed:\n{0}")]
    Validation(ValidationReport),

    #[error("Node '{node}' failed: {source}")]
    NodeFailed {
        node: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("Module '{module}' requires {policy} but {found} target(s) were given")]
    TargetCount {
        module: String,
        policy: TargetPolicy,
        found: usize,
    },

    #[error("Module '{module}' lists the same target configuration more than once")]
    RepeatedTarget { module: String },

    #[error("Module '{module}' failed: {source}")]
    ModuleFailed {
        module: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("No module of type '{0}' is registered")]
    UnknownModule(String),

    #[error("Test of {quantity} failed: deviation {deviation:e} exceeds threshold {threshold:e}")]
    TestFailed {
        quantity: String,
        deviation: f64,
        threshold: f64,
    },

    #[error("Procedure '{procedure}' cannot run in the {context} context")]
    ContextMismatch {
        procedure: String,
        context: NodeContext,
    },

    #[error("Item stores disagree between workers on {} item(s)", .keys.len())]
    Inconsistent { keys: Vec<ItemKey> },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Wraps `self` as the failure of `node`, unless it already names a failing node.
    pub(crate) fn in_node(self, node: &str) -> Self {
        match self {
            EngineError::NodeFailed { .. } => self,
            other => EngineError::NodeFailed {
                node: node.to_string(),
                source: Box::new(other),
            },
        }
    }
}
