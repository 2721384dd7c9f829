//! Engine-level error types.

use nodes::{NodeError, NodeKind, OperationError};
use thiserror::Error;

/// Errors produced by the workflow engine.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Run admission ------

    /// A run was requested while another one is active.
    #[error("Workflow is already running")]
    AlreadyRunning,

    /// The workflow has no `start` node.
    #[error("Start node not found")]
    StartNodeNotFound,

    // ------ Execution errors ------

    /// No handler is registered for the node's kind.
    #[error("no handler registered for node '{node_id}' of kind '{kind}'")]
    UnknownNodeKind { node_id: String, kind: NodeKind },

    /// A required configuration field is missing.
    #[error("node '{node_id}' is misconfigured: {message}")]
    Configuration { node_id: String, message: String },

    /// The device adapter call failed.
    #[error("node '{node_id}' failed: {source}")]
    Operation {
        node_id: String,
        #[source]
        source: OperationError,
    },

    /// A node was re-entered more often than the run's visit bound allows.
    #[error("node '{node_id}' was visited more than {limit} times in one run")]
    VisitLimitExceeded { node_id: String, limit: u64 },
}

impl EngineError {
    /// Attribute a handler error to the node that raised it.
    pub fn from_node(node_id: &str, error: NodeError) -> Self {
        match error {
            NodeError::Configuration(message) => Self::Configuration {
                node_id: node_id.to_owned(),
                message,
            },
            NodeError::Operation(source) => Self::Operation {
                node_id: node_id.to_owned(),
                source,
            },
        }
    }

    /// Stable tag recorded next to the error in the execution log.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::AlreadyRunning => "already_running",
            EngineError::StartNodeNotFound => "start_node_not_found",
            EngineError::UnknownNodeKind { .. } => "unknown_node_kind",
            EngineError::Configuration { .. } => "configuration_error",
            EngineError::Operation { .. } => "operation_error",
            EngineError::VisitLimitExceeded { .. } => "visit_limit_exceeded",
        }
    }

    /// The node the error is attributed to, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            EngineError::UnknownNodeKind { node_id, .. }
            | EngineError::Configuration { node_id, .. }
            | EngineError::Operation { node_id, .. }
            | EngineError::VisitLimitExceeded { node_id, .. } => Some(node_id),
            EngineError::AlreadyRunning | EngineError::StartNodeNotFound => None,
        }
    }
}
