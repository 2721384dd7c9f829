//! Workflow execution engine.
//!
//! `WorkflowEngine` is the central orchestrator:
//! 1. Builds the execution graph and locates the start node.
//! 2. Walks the graph depth-first, dispatching each node via its handler.
//! 3. Lets each node's outcome pick which outgoing edges to follow.
//! 4. Stops between nodes when asked to, or at the first node error.
//! 5. Leaves the context idle when a run method returns, however it ended.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nodes::config::LoopConfig;
use nodes::{DeviceOperations, NodeRegistry};
use serde_json::{json, Map, Value};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::branch::select_next;
use crate::cancel::CancellationController;
use crate::config::EngineConfig;
use crate::context::{ContextManager, ExecutionContext, ExecutionStats, NodeStatus};
use crate::dispatch::Dispatcher;
use crate::graph::{self, ExecutionGraph};
use crate::models::{NodeKind, WorkflowEdge, WorkflowNode};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Output of a completed run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// No reachable node was left to run.
    Completed,
    /// A stop request was honoured.
    Stopped,
}

/// The result of a run that did not fail.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub status: RunStatus,
    pub stats: ExecutionStats,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Per-run bookkeeping
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RunState {
    visits: HashMap<String, u64>,
    visit_limit: u64,
    executed: HashSet<String>,
    bypassed: HashSet<String>,
}

impl RunState {
    /// Bypassed by a branch decision and never executed afterwards.
    fn skipped(&self) -> usize {
        self.bypassed.difference(&self.executed).count()
    }
}

/// Visits the counted loops of a workflow can cause for a single node: the
/// product of `count + 1` over every counted loop node.
fn loop_visit_allowance(nodes: &[WorkflowNode]) -> u64 {
    let counts: Vec<u64> = nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Loop)
        .filter_map(|n| LoopConfig::parse(&n.config).ok())
        .filter(|parsed| parsed.config.is_counted())
        .map(|parsed| u64::from(parsed.config.count) + 1)
        .collect();
    if counts.is_empty() {
        return 0;
    }
    counts.into_iter().fold(1, u64::saturating_mul)
}

/// Holds the run slot. Releasing it clears the stop flag and frees the slot;
/// the context does this while the terminal snapshot is still unpublished.
/// Dropping an unreleased guard (e.g. a cancelled run future) leaves the
/// context idle and releases it.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    cancel: &'a CancellationController,
    context: &'a ContextManager,
    released: bool,
}

impl RunGuard<'_> {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.cancel.reset();
            self.running.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let context = self.context;
        context.ensure_idle(|| self.release());
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Runs workflows against one device adapter, one run at a time.
///
/// All methods take `&self`; share the engine behind an `Arc` to stop a run
/// or read its context from another task.
pub struct WorkflowEngine {
    registry: NodeRegistry,
    device: Arc<dyn DeviceOperations>,
    config: EngineConfig,
    context: ContextManager,
    cancel: CancellationController,
    running: AtomicBool,
}

impl WorkflowEngine {
    /// Create an engine with the built-in node handlers.
    pub fn new(device: Arc<dyn DeviceOperations>, config: EngineConfig) -> Self {
        Self::with_registry(device, NodeRegistry::builtin(), config)
    }

    pub fn with_registry(
        device: Arc<dyn DeviceOperations>,
        registry: NodeRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            device,
            context: ContextManager::new(config.workflow_log_id.clone()),
            config,
            cancel: CancellationController::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Share an existing stop flag, e.g. one handed to a UI before the
    /// engine exists.
    pub fn with_cancellation(mut self, cancel: CancellationController) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receive a serialised [`ExecutionContext`] after every change.
    pub fn subscribe(&self) -> watch::Receiver<Value> {
        self.context.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn get_context(&self) -> ExecutionContext {
        self.context.context()
    }

    /// Whether any run has begun on this engine.
    pub fn has_context(&self) -> bool {
        self.context.has_started()
    }

    pub fn stats(&self) -> ExecutionStats {
        self.context.stats()
    }

    /// Request the current run to stop at the next node boundary.
    ///
    /// Returns `false` when nothing is running.
    pub fn stop_execution(&self) -> bool {
        let requested = self.context.exclusive(|| {
            let running = self.is_running();
            if running {
                self.cancel.stop();
            }
            running
        });
        if requested {
            info!("stop requested");
        }
        requested
    }

    /// Run a workflow from its start node.
    ///
    /// # Errors
    /// [`EngineError::AlreadyRunning`] without touching the context when a
    /// run is active; otherwise the first error raised while running, after
    /// it has been logged and the context finalised.
    #[instrument(skip(self, nodes, edges), fields(device = %device_key, node_count = nodes.len()))]
    pub async fn execute_workflow(
        &self,
        nodes: &[WorkflowNode],
        edges: &[WorkflowEdge],
        device_key: &str,
    ) -> Result<RunSummary, EngineError> {
        let guard = self.try_begin()?;
        let started = Instant::now();

        self.context.begin_workflow(nodes);
        self.context.add_log(
            self.context.workflow_log_id(),
            NodeStatus::Running,
            "Starting workflow execution",
            None,
            Some(workflow_details(&[
                ("nodes", json!(nodes.len())),
                ("edges", json!(edges.len())),
                ("deviceKey", json!(device_key)),
            ])),
        );

        for issue in graph::check(nodes, edges) {
            warn!(%issue, "workflow graph issue");
        }

        let graph = ExecutionGraph::build(nodes, edges);
        let mut run = RunState {
            visit_limit: u64::from(self.config.max_visits_per_node)
                .saturating_add(loop_visit_allowance(nodes)),
            ..RunState::default()
        };
        let result = match graph.start_node() {
            Some(start) => self.traverse(&graph, start, device_key, &mut run).await,
            None => Err(EngineError::StartNodeNotFound),
        };

        self.conclude(guard, result, run.skipped(), started)
    }

    /// Run one node on its own, without following any edges.
    ///
    /// Only the node's own status changes; statuses recorded by earlier runs
    /// for other nodes are kept.
    #[instrument(skip(self, node), fields(device = %device_key, node_id = %node.id))]
    pub async fn execute_single_node(
        &self,
        node: &WorkflowNode,
        device_key: &str,
    ) -> Result<RunSummary, EngineError> {
        let guard = self.try_begin()?;
        let started = Instant::now();

        self.context.begin_single();
        self.context.add_log(
            self.context.workflow_log_id(),
            NodeStatus::Running,
            format!("Executing single node: {}", node.display_name()),
            None,
            Some(workflow_details(&[
                ("nodeId", json!(node.id)),
                ("deviceKey", json!(device_key)),
            ])),
        );

        self.context
            .update_context(|c| c.current_node_id = Some(node.id.clone()));
        let result = self
            .dispatcher()
            .execute_node_logic(node, device_key)
            .await
            .map(|_| RunStatus::Completed);

        self.conclude(guard, result, 0, started)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn try_begin(&self) -> Result<RunGuard<'_>, EngineError> {
        // Claiming the slot and clearing the stop flag must not interleave
        // with `stop_execution`.
        let claimed = self.context.exclusive(|| {
            let claimed = self
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
            if claimed {
                self.cancel.reset();
            }
            claimed
        });
        if !claimed {
            info!("run rejected, another run is in progress");
            return Err(EngineError::AlreadyRunning);
        }
        Ok(RunGuard {
            running: &self.running,
            cancel: &self.cancel,
            context: &self.context,
            released: false,
        })
    }

    fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher {
            registry: &self.registry,
            device: self.device.as_ref(),
            context: &self.context,
        }
    }

    /// Depth-first walk over an explicit stack.
    ///
    /// Selected successors are pushed in reverse so the first edge is run
    /// first, and each subtree completes before its next sibling starts.
    async fn traverse<'g>(
        &self,
        graph: &'g ExecutionGraph,
        start: &'g WorkflowNode,
        device_key: &str,
        run: &mut RunState,
    ) -> Result<RunStatus, EngineError> {
        let dispatcher = self.dispatcher();
        let mut stack: Vec<&'g WorkflowNode> = vec![start];

        while let Some(node) = stack.pop() {
            if self.cancel.is_stopped() {
                return Ok(RunStatus::Stopped);
            }

            let visits = run.visits.entry(node.id.clone()).or_insert(0);
            *visits += 1;
            if *visits > run.visit_limit {
                return Err(EngineError::VisitLimitExceeded {
                    node_id: node.id.clone(),
                    limit: run.visit_limit,
                });
            }
            run.executed.insert(node.id.clone());

            self.context
                .update_context(|c| c.current_node_id = Some(node.id.clone()));
            let outcome = dispatcher.execute_node_logic(node, device_key).await?;

            if self.cancel.is_stopped() {
                return Ok(RunStatus::Stopped);
            }

            let selection = select_next(graph, &node.id, outcome);
            run.bypassed
                .extend(selection.bypassed.iter().map(|n| n.id.clone()));
            stack.extend(selection.next.into_iter().rev());
        }

        Ok(RunStatus::Completed)
    }

    /// Log the run's end, finalise the context, free the run slot and build
    /// the summary.
    fn conclude(
        &self,
        mut guard: RunGuard<'_>,
        result: Result<RunStatus, EngineError>,
        skipped: usize,
        started: Instant,
    ) -> Result<RunSummary, EngineError> {
        let elapsed = started.elapsed();
        let workflow_id = self.context.workflow_log_id();

        match &result {
            Ok(RunStatus::Completed) => {
                info!(elapsed_ms = elapsed.as_millis() as u64, "workflow completed");
                self.context.add_log(
                    workflow_id,
                    NodeStatus::Success,
                    "Workflow execution completed",
                    Some(elapsed),
                    None,
                );
            }
            Ok(RunStatus::Stopped) => {
                info!("workflow stopped by user");
                self.context.add_log(
                    workflow_id,
                    NodeStatus::Success,
                    "Workflow execution stopped by user",
                    Some(elapsed),
                    Some(workflow_details(&[("reason", json!("user_requested"))])),
                );
            }
            Err(e) => {
                error!(error = %e, kind = e.kind(), "workflow failed");
                let mut details = workflow_details(&[
                    ("error", json!(e.to_string())),
                    ("errorKind", json!(e.kind())),
                ]);
                if let Some(node_id) = e.node_id() {
                    details.insert("nodeId".into(), json!(node_id));
                }
                self.context.add_log(
                    workflow_id,
                    NodeStatus::Error,
                    format!("Workflow execution failed: {e}"),
                    Some(elapsed),
                    Some(details),
                );
            }
        }

        let stats = self.context.finish(skipped, || guard.release());
        let status = result?;
        Ok(RunSummary {
            status,
            stats,
            elapsed,
        })
    }
}

fn workflow_details(fields: &[(&str, Value)]) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}
