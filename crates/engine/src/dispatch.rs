//! Node execution with structured logging.
//!
//! The dispatcher validates a node, looks up its handler and runs it against
//! the device, bracketing the call with `running` and `success`/`error`
//! entries in the execution log.

use std::fmt;
use std::time::{Duration, Instant};

use nodes::{DeviceOperations, NodeContext, NodeError, NodeHandler, NodeOutcome, NodeRegistry};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::context::{ContextManager, NodeStatus};
use crate::error::EngineError;
use crate::models::WorkflowNode;

/// Coarse speed rating attached to successful nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceTier {
    Fast,
    Normal,
    Slow,
    VerySlow,
}

impl PerformanceTier {
    pub fn from_duration(elapsed: Duration) -> Self {
        match elapsed.as_millis() {
            0..=999 => PerformanceTier::Fast,
            1_000..=4_999 => PerformanceTier::Normal,
            5_000..=9_999 => PerformanceTier::Slow,
            _ => PerformanceTier::VerySlow,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceTier::Fast => "Fast",
            PerformanceTier::Normal => "Normal",
            PerformanceTier::Slow => "Slow",
            PerformanceTier::VerySlow => "Very Slow",
        }
    }
}

impl fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) struct Dispatcher<'e> {
    pub registry: &'e NodeRegistry,
    pub device: &'e dyn DeviceOperations,
    pub context: &'e ContextManager,
}

impl Dispatcher<'_> {
    /// Run one node and return its branch decision.
    ///
    /// Configuration errors are raised before the device is touched. Any
    /// error is logged against the node and returned for the caller to abort.
    pub async fn execute_node_logic(
        &self,
        node: &WorkflowNode,
        device_key: &str,
    ) -> Result<NodeOutcome, EngineError> {
        let Some(handler) = self.registry.get(node.kind) else {
            let error = EngineError::UnknownNodeKind {
                node_id: node.id.clone(),
                kind: node.kind,
            };
            self.context.add_log(
                &node.id,
                NodeStatus::Error,
                format!("{} failed: {error}", node.display_name()),
                None,
                Some(error_details(&error, "Register a handler for this node kind")),
            );
            return Err(error);
        };

        let validation = match handler.validate(&node.config) {
            Ok(validation) => validation,
            Err(e) => return Err(self.fail(node, handler.as_ref(), e, None)),
        };

        let mut details = validation.details;
        details.insert("kind".into(), json!(node.kind));
        if !validation.warnings.is_empty() {
            for warning in &validation.warnings {
                warn!(node_id = %node.id, kind = %node.kind, "{warning}");
            }
            details.insert("warnings".into(), json!(validation.warnings));
        }

        self.context.add_log(
            &node.id,
            NodeStatus::Running,
            format!("Executing {} node: {}", node.kind, node.display_name()),
            None,
            Some(details.clone()),
        );

        let started = Instant::now();
        let mut variables = self.context.variables();
        let before = variables.clone();

        let mut ctx = NodeContext::new(&node.id, device_key, self.device, &mut variables);
        let result = handler.execute(&node.config, &mut ctx).await;
        let notes = ctx.into_notes();
        let elapsed = started.elapsed();

        if variables != before {
            self.context.update_context(|c| c.variables = variables);
        }

        match result {
            Ok(outcome) => {
                let tier = PerformanceTier::from_duration(elapsed);
                details.extend(notes);
                details.insert("performance".into(), json!(tier.as_str()));
                debug!(node_id = %node.id, ?outcome, elapsed_ms = elapsed.as_millis() as u64, "node succeeded");

                self.context.add_log(
                    &node.id,
                    NodeStatus::Success,
                    format!("{} completed ({tier})", node.display_name()),
                    Some(elapsed),
                    Some(details),
                );
                Ok(outcome)
            }
            Err(e) => Err(self.fail(node, handler.as_ref(), e, Some(elapsed))),
        }
    }

    fn fail(
        &self,
        node: &WorkflowNode,
        handler: &dyn NodeHandler,
        error: NodeError,
        elapsed: Option<Duration>,
    ) -> EngineError {
        let suggestion = handler.suggestion(&error);
        let error = EngineError::from_node(&node.id, error);
        warn!(node_id = %node.id, kind = %node.kind, error = %error, "node failed");

        self.context.add_log(
            &node.id,
            NodeStatus::Error,
            format!("{} failed: {error}", node.display_name()),
            elapsed,
            Some(error_details(&error, &suggestion)),
        );
        error
    }
}

fn error_details(error: &EngineError, suggestion: &str) -> Map<String, Value> {
    let mut details = Map::new();
    details.insert("error".into(), json!(error.to_string()));
    details.insert("errorKind".into(), json!(error.kind()));
    if let EngineError::Operation { source, .. } = error {
        if let Some(kind) = &source.kind {
            details.insert("operationKind".into(), json!(kind));
        }
    }
    details.insert("suggestion".into(), json!(suggestion));
    details
}
