//! Built-in node handlers, one per [`NodeKind`].

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{
    generated_screenshot_name, ClickConfig, CloseConfig, ConditionConfig, InputConfig, LoopConfig, Parsed, ScreenshotConfig,
    ScrollConfig, StartConfig, SwipeConfig, WaitConfig,
};
use crate::traits::{NodeContext, NodeHandler, NodeOutcome, Validation};
use crate::{NodeError, NodeKind};

/// Variable under which a loop node keeps its completed pass count.
pub fn loop_counter_key(node_id: &str) -> String {
    format!("loop:{node_id}")
}

fn into_validation<T: Serialize>(parsed: Parsed<T>) -> Validation {
    Validation {
        details: parsed.details(),
        warnings: parsed.warnings,
    }
}

/// Shared remediation text; `operation` is used for device failures.
fn suggest(error: &NodeError, operation: &str) -> String {
    match error {
        NodeError::Configuration(_) => {
            "Open the node settings and fill in the required fields".to_string()
        }
        NodeError::Operation(_) => operation.to_string(),
    }
}

// ---------------------------------------------------------------------------
// start
// ---------------------------------------------------------------------------

pub struct StartNode;

#[async_trait]
impl NodeHandler for StartNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Start
    }

    fn validate(&self, config: &Value) -> Result<Validation, NodeError> {
        StartConfig::parse(config).map(into_validation)
    }

    async fn execute(
        &self,
        config: &Value,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutcome, NodeError> {
        let parsed = StartConfig::parse(config)?;
        match parsed.config.package_name.as_deref() {
            Some(package) => {
                ctx.device
                    .start_application(ctx.device_key, &parsed.config)
                    .await?;
                ctx.note("launched", package);
            }
            None => debug!(node_id = %ctx.node_id, "start node has no application to launch"),
        }
        Ok(NodeOutcome::Continue)
    }

    fn suggestion(&self, error: &NodeError) -> String {
        suggest(
            error,
            "Check that the application is installed on the device and the package name is correct",
        )
    }
}

// ---------------------------------------------------------------------------
// click / input
// ---------------------------------------------------------------------------

pub struct ClickNode;

#[async_trait]
impl NodeHandler for ClickNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Click
    }

    fn validate(&self, config: &Value) -> Result<Validation, NodeError> {
        ClickConfig::parse(config).map(into_validation)
    }

    async fn execute(
        &self,
        config: &Value,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutcome, NodeError> {
        let parsed = ClickConfig::parse(config)?;
        ctx.device.perform_click(ctx.device_key, &parsed.config).await?;
        Ok(NodeOutcome::Continue)
    }

    fn suggestion(&self, error: &NodeError) -> String {
        suggest(
            error,
            "Verify the selector matches a visible element, or switch to screen coordinates",
        )
    }
}

pub struct InputNode;

#[async_trait]
impl NodeHandler for InputNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Input
    }

    fn validate(&self, config: &Value) -> Result<Validation, NodeError> {
        InputConfig::parse(config).map(into_validation)
    }

    async fn execute(
        &self,
        config: &Value,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutcome, NodeError> {
        let parsed = InputConfig::parse(config)?;
        ctx.device.perform_input(ctx.device_key, &parsed.config).await?;
        ctx.note("characters", parsed.config.text.chars().count());
        Ok(NodeOutcome::Continue)
    }

    fn suggestion(&self, error: &NodeError) -> String {
        match error {
            NodeError::Configuration(_) => {
                "Set a selector for the text field this node should type into".to_string()
            }
            NodeError::Operation(_) => {
                "Make sure the input field is visible and focusable before typing".to_string()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// close / wait
// ---------------------------------------------------------------------------

pub struct CloseNode;

#[async_trait]
impl NodeHandler for CloseNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Close
    }

    fn validate(&self, config: &Value) -> Result<Validation, NodeError> {
        CloseConfig::parse(config).map(into_validation)
    }

    async fn execute(
        &self,
        config: &Value,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutcome, NodeError> {
        let parsed = CloseConfig::parse(config)?;
        ctx.device
            .close_application(ctx.device_key, &parsed.config)
            .await?;
        Ok(NodeOutcome::Continue)
    }

    fn suggestion(&self, error: &NodeError) -> String {
        suggest(error, "Check that the application is running and the package name is correct")
    }
}

pub struct WaitNode;

#[async_trait]
impl NodeHandler for WaitNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Wait
    }

    fn validate(&self, config: &Value) -> Result<Validation, NodeError> {
        WaitConfig::parse(config).map(into_validation)
    }

    async fn execute(
        &self,
        config: &Value,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutcome, NodeError> {
        let parsed = WaitConfig::parse(config)?;
        ctx.device
            .perform_wait(ctx.device_key, parsed.config.as_duration())
            .await?;
        Ok(NodeOutcome::Continue)
    }

    fn suggestion(&self, error: &NodeError) -> String {
        suggest(error, "Retry the run; waits only fail when the device connection drops")
    }
}

// ---------------------------------------------------------------------------
// scroll / swipe
// ---------------------------------------------------------------------------

pub struct ScrollNode;

#[async_trait]
impl NodeHandler for ScrollNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Scroll
    }

    fn validate(&self, config: &Value) -> Result<Validation, NodeError> {
        ScrollConfig::parse(config).map(into_validation)
    }

    async fn execute(
        &self,
        config: &Value,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutcome, NodeError> {
        let parsed = ScrollConfig::parse(config)?;
        ctx.device.perform_scroll(ctx.device_key, &parsed.config).await?;
        Ok(NodeOutcome::Continue)
    }

    fn suggestion(&self, error: &NodeError) -> String {
        suggest(error, "Confirm the screen or container is scrollable in that direction")
    }
}

pub struct SwipeNode;

#[async_trait]
impl NodeHandler for SwipeNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Swipe
    }

    fn validate(&self, config: &Value) -> Result<Validation, NodeError> {
        SwipeConfig::parse(config).map(into_validation)
    }

    async fn execute(
        &self,
        config: &Value,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutcome, NodeError> {
        let parsed = SwipeConfig::parse(config)?;
        ctx.device.perform_swipe(ctx.device_key, &parsed.config).await?;
        Ok(NodeOutcome::Continue)
    }

    fn suggestion(&self, error: &NodeError) -> String {
        suggest(error, "Keep swipe coordinates inside the device screen bounds")
    }
}

// ---------------------------------------------------------------------------
// screenshot
// ---------------------------------------------------------------------------

pub struct ScreenshotNode;

#[async_trait]
impl NodeHandler for ScreenshotNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Screenshot
    }

    fn validate(&self, config: &Value) -> Result<Validation, NodeError> {
        ScreenshotConfig::parse(config).map(into_validation)
    }

    async fn execute(
        &self,
        config: &Value,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutcome, NodeError> {
        let mut screenshot = ScreenshotConfig::parse(config)?.config;
        let filename = screenshot
            .filename
            .get_or_insert_with(generated_screenshot_name)
            .clone();
        let path = ctx.device.take_screenshot(ctx.device_key, &screenshot).await?;
        ctx.note("filename", filename);
        ctx.note("path", path.display().to_string());

        // The capture already succeeded; a missing size is not worth failing over.
        let size = ctx.device.get_file_size(&path).await;
        match size {
            Ok(size) => ctx.note("fileSize", size),
            Err(e) => warn!(node_id = %ctx.node_id, error = %e, "could not read screenshot size"),
        }
        Ok(NodeOutcome::Continue)
    }

    fn suggestion(&self, error: &NodeError) -> String {
        suggest(error, "Check that the save path exists and the device screen is unlocked")
    }
}

// ---------------------------------------------------------------------------
// condition / loop
// ---------------------------------------------------------------------------

pub struct ConditionNode;

#[async_trait]
impl NodeHandler for ConditionNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Condition
    }

    fn validate(&self, config: &Value) -> Result<Validation, NodeError> {
        ConditionConfig::parse(config).map(into_validation)
    }

    async fn execute(
        &self,
        config: &Value,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutcome, NodeError> {
        let parsed = ConditionConfig::parse(config)?;
        let checked = ctx
            .device
            .check_condition(ctx.device_key, &parsed.config)
            .await;
        let result = match checked {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    node_id = %ctx.node_id,
                    error = %e,
                    "condition check failed, taking the false branch"
                );
                ctx.note("checkError", e.message);
                false
            }
        };
        ctx.note("result", result);
        Ok(NodeOutcome::Branch(result))
    }

    fn suggestion(&self, error: &NodeError) -> String {
        match error {
            NodeError::Configuration(_) => {
                "Set a selector for the element this condition should inspect".to_string()
            }
            NodeError::Operation(_) => {
                "Verify the selector; a failed check is treated as false".to_string()
            }
        }
    }
}

/// Counted loop keyed by node id.
///
/// Each visit compares the passes completed so far with `count`. While
/// looping the counter grows by one per visit; on exit it is cleared so an
/// enclosing loop can run this one again from zero.
pub struct LoopNode;

#[async_trait]
impl NodeHandler for LoopNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Loop
    }

    fn validate(&self, config: &Value) -> Result<Validation, NodeError> {
        LoopConfig::parse(config).map(into_validation)
    }

    async fn execute(
        &self,
        config: &Value,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutcome, NodeError> {
        let parsed = LoopConfig::parse(config)?;
        if !parsed.config.is_counted() {
            debug!(
                node_id = %ctx.node_id,
                loop_type = %parsed.config.loop_type,
                "only counted loops are supported, ending loop"
            );
            return Ok(NodeOutcome::Loop { should_loop: false });
        }

        let key = loop_counter_key(ctx.node_id);
        let passes = ctx.variables.get(&key).and_then(Value::as_u64).unwrap_or(0);
        let count = u64::from(parsed.config.count);
        let should_loop = passes < count;

        if should_loop {
            ctx.variables.insert(key, Value::from(passes + 1));
            ctx.note("iteration", passes + 1);
        } else {
            ctx.variables.remove(&key);
            ctx.note("completedIterations", passes);
        }
        ctx.note("count", count);

        Ok(NodeOutcome::Loop { should_loop })
    }

    fn suggestion(&self, error: &NodeError) -> String {
        suggest(error, "Check the loop count and that the loop body reconnects to this node")
    }
}
