//! Node-level error types.

use thiserror::Error;

/// Failure reported by a [`DeviceOperations`](crate::DeviceOperations) call.
///
/// Carries a human-readable message and, when the adapter knows it, a short
/// machine tag (`"timeout"`, `"element_not_found"`, ...).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct OperationError {
    pub message: String,
    pub kind: Option<String>,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    /// Attach a machine-readable tag to the error.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

/// Errors returned by a node handler.
///
/// Both variants abort the node, and with it the whole run. Configuration
/// problems that only deserve a warning never surface here; they are
/// reported through [`Validation::warnings`](crate::Validation).
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// A required configuration field is missing or unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The device adapter call failed.
    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl NodeError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
