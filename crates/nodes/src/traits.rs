//! The `NodeHandler` trait: the contract every node kind must fulfil.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{DeviceOperations, NodeError, NodeKind};

/// What a node's execution tells the engine about where to go next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Follow every outgoing edge.
    Continue,
    /// Follow the `"true"` or `"false"` edges.
    Branch(bool),
    /// Follow the `"loop"` edges when set, otherwise the `"end"` edges.
    Loop { should_loop: bool },
}

impl NodeOutcome {
    /// Edge handle selected by this outcome; `None` selects all edges.
    pub fn branch_label(&self) -> Option<&'static str> {
        match self {
            NodeOutcome::Continue => None,
            NodeOutcome::Branch(true) => Some("true"),
            NodeOutcome::Branch(false) => Some("false"),
            NodeOutcome::Loop { should_loop: true } => Some("loop"),
            NodeOutcome::Loop { should_loop: false } => Some("end"),
        }
    }
}

/// Result of checking a node's configuration before it runs.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    /// Non-fatal problems; execution continues with defaults.
    pub warnings: Vec<String>,
    /// Contextual fields for the node's log entries (selector, coordinates, ...).
    pub details: Map<String, Value>,
}

/// Everything a handler may touch while it runs.
///
/// Handlers record extra log fields (a screenshot path, a loop iteration)
/// through [`NodeContext::note`]; the dispatcher attaches them to the
/// node's success entry.
pub struct NodeContext<'a> {
    pub node_id: &'a str,
    pub device_key: &'a str,
    pub device: &'a dyn DeviceOperations,
    /// Run-scoped variables, shared by every node of the run.
    pub variables: &'a mut Map<String, Value>,
    notes: Map<String, Value>,
}

impl<'a> NodeContext<'a> {
    pub fn new(
        node_id: &'a str,
        device_key: &'a str,
        device: &'a dyn DeviceOperations,
        variables: &'a mut Map<String, Value>,
    ) -> Self {
        Self {
            node_id,
            device_key,
            device,
            variables,
            notes: Map::new(),
        }
    }

    pub fn note(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.notes.insert(key.into(), value.into());
    }

    pub fn into_notes(self) -> Map<String, Value> {
        self.notes
    }
}

/// The core node trait.
///
/// One implementation per [`NodeKind`]. `validate` runs before any device
/// call; a hard error there aborts the node without touching the device.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    fn kind(&self) -> NodeKind;

    /// Check the node's configuration.
    fn validate(&self, config: &Value) -> Result<Validation, NodeError>;

    /// Perform the node's device work and report the branch decision.
    async fn execute(
        &self,
        config: &Value,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutcome, NodeError>;

    /// Remediation hint shown next to a failed node in the execution log.
    fn suggestion(&self, error: &NodeError) -> String;
}
