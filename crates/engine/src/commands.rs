//! Request/response surface consumed by a UI layer.
//!
//! Each command maps an engine call onto `{ success, error? }`. Failures,
//! including a rejected concurrent run, come back as `success: false`.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ExecutionContext;
use crate::executor::{RunSummary, WorkflowEngine};
use crate::models::{WorkflowEdge, WorkflowNode};
use crate::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

impl From<Result<RunSummary, EngineError>> for CommandResponse {
    fn from(result: Result<RunSummary, EngineError>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteWorkflowRequest {
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
    pub device_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteSingleNodeRequest {
    pub node: WorkflowNode,
    pub device_key: String,
}

/// `execute-workflow`
pub async fn execute_workflow(
    engine: &WorkflowEngine,
    request: ExecuteWorkflowRequest,
) -> CommandResponse {
    engine
        .execute_workflow(&request.nodes, &request.edges, &request.device_key)
        .await
        .into()
}

/// `stop-workflow`: succeeds whether or not a run was active.
pub fn stop_workflow(engine: &WorkflowEngine) -> CommandResponse {
    if !engine.stop_execution() {
        info!("stop requested with no run in progress");
    }
    CommandResponse::ok()
}

/// `get-workflow-context`: `None` until the engine has run something.
pub fn get_workflow_context(engine: &WorkflowEngine) -> Option<ExecutionContext> {
    engine.has_context().then(|| engine.get_context())
}

/// `execute-single-node`
pub async fn execute_single_node(
    engine: &WorkflowEngine,
    request: ExecuteSingleNodeRequest,
) -> CommandResponse {
    engine
        .execute_single_node(&request.node, &request.device_key)
        .await
        .into()
}
