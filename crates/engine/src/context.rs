//! Run state, execution log and progress push.
//!
//! [`ContextManager`] owns the single mutable [`ExecutionContext`] of an
//! engine. While anyone is subscribed, every mutation re-serialises the
//! context and publishes it on a `watch` channel: subscribers always see the
//! newest snapshot, intermediate ones may be skipped.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::error;
use uuid::Uuid;

use crate::models::{NodeKind, WorkflowNode};

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Success,
    Error,
}

/// One line of the execution trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: Uuid,
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: NodeStatus,
    pub message: String,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub total_nodes: usize,
    pub executed_nodes: usize,
    pub success_nodes: usize,
    pub error_nodes: usize,
    pub skipped_nodes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub is_running: bool,
    pub current_node_id: Option<String>,
    pub execution_log: Vec<LogEntry>,
    pub variables: Map<String, Value>,
    pub node_statuses: BTreeMap<String, NodeStatus>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    context: ExecutionContext,
    stats: ExecutionStats,
    /// Nodes that already entered `running` this run.
    seen: HashSet<String>,
    /// Nodes logged but left out of the stats (start nodes).
    uncounted: HashSet<String>,
    started: bool,
}

pub struct ContextManager {
    workflow_log_id: String,
    state: Mutex<State>,
    publisher: watch::Sender<Value>,
}

impl ContextManager {
    pub fn new(workflow_log_id: impl Into<String>) -> Self {
        let (publisher, _) = watch::channel(Value::Null);
        Self {
            workflow_log_id: workflow_log_id.into(),
            state: Mutex::new(State::default()),
            publisher,
        }
    }

    pub fn workflow_log_id(&self) -> &str {
        &self.workflow_log_id
    }

    /// Receive serialised snapshots. The first value is the current context,
    /// or `null` before any run has begun.
    pub fn subscribe(&self) -> watch::Receiver<Value> {
        let state = self.lock();
        if state.started {
            self.send(&state);
        }
        self.publisher.subscribe()
    }

    pub fn context(&self) -> ExecutionContext {
        self.lock().context.clone()
    }

    /// A copy of the workflow variables only.
    pub fn variables(&self) -> Map<String, Value> {
        self.lock().context.variables.clone()
    }

    pub fn stats(&self) -> ExecutionStats {
        self.lock().stats
    }

    /// Whether any run has begun on this manager.
    pub fn has_started(&self) -> bool {
        self.lock().started
    }

    /// Apply `apply` to the context and publish the result.
    pub fn update_context(&self, apply: impl FnOnce(&mut ExecutionContext)) {
        let mut state = self.lock();
        apply(&mut state.context);
        self.publish(&state);
    }

    /// Append a log entry, update the node's status and the stats, publish.
    pub fn add_log(
        &self,
        node_id: &str,
        status: NodeStatus,
        message: impl Into<String>,
        duration: Option<Duration>,
        details: Option<Map<String, Value>>,
    ) -> LogEntry {
        let entry = LogEntry {
            id: Uuid::new_v4(),
            node_id: node_id.to_owned(),
            timestamp: Utc::now(),
            status,
            message: message.into(),
            duration: duration.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            details,
        };

        let mut state = self.lock();
        state.context.execution_log.push(entry.clone());

        if node_id != self.workflow_log_id {
            state
                .context
                .node_statuses
                .insert(node_id.to_owned(), status);

            if !state.uncounted.contains(node_id) {
                match status {
                    NodeStatus::Running => {
                        if state.seen.insert(node_id.to_owned()) {
                            state.stats.executed_nodes += 1;
                        }
                    }
                    NodeStatus::Success => state.stats.success_nodes += 1,
                    NodeStatus::Error => state.stats.error_nodes += 1,
                    NodeStatus::Pending => {}
                }
            }
        }

        self.publish(&state);
        entry
    }

    /// Reset everything for a full workflow run.
    pub(crate) fn begin_workflow(&self, nodes: &[WorkflowNode]) {
        let mut state = self.lock();
        let uncounted: HashSet<String> = nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Start)
            .map(|n| n.id.clone())
            .collect();
        let total = nodes.iter().filter(|n| !uncounted.contains(&n.id)).count();

        *state = State {
            context: ExecutionContext {
                is_running: true,
                node_statuses: nodes
                    .iter()
                    .map(|n| (n.id.clone(), NodeStatus::Pending))
                    .collect(),
                ..ExecutionContext::default()
            },
            stats: ExecutionStats {
                total_nodes: total,
                ..ExecutionStats::default()
            },
            seen: HashSet::new(),
            uncounted,
            started: true,
        };
        self.publish(&state);
    }

    /// Prepare for a single-node run. Node statuses and variables survive.
    pub(crate) fn begin_single(&self) {
        let mut state = self.lock();
        state.context.is_running = true;
        state.context.current_node_id = None;
        state.context.execution_log.clear();
        state.stats = ExecutionStats {
            total_nodes: 1,
            ..ExecutionStats::default()
        };
        state.seen.clear();
        state.uncounted.clear();
        state.started = true;
        self.publish(&state);
    }

    /// Mark the run as over, call `release` and publish the terminal
    /// snapshot. `release` runs before anyone can observe the idle context.
    pub(crate) fn finish(&self, skipped: usize, release: impl FnOnce()) -> ExecutionStats {
        let mut state = self.lock();
        state.stats.skipped_nodes = skipped;
        state.context.is_running = false;
        state.context.current_node_id = None;
        release();
        self.publish(&state);
        state.stats
    }

    /// Clear `is_running` if a run ended without [`finish`](Self::finish).
    /// `release` is called either way.
    pub(crate) fn ensure_idle(&self, release: impl FnOnce()) {
        let mut state = self.lock();
        release();
        if state.context.is_running {
            state.context.is_running = false;
            state.context.current_node_id = None;
            self.publish(&state);
        }
    }

    /// Run `apply` while no snapshot can be taken or published.
    pub(crate) fn exclusive<R>(&self, apply: impl FnOnce() -> R) -> R {
        let _state = self.lock();
        apply()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State) {
        // Late subscribers get a fresh snapshot in `subscribe`.
        if self.publisher.receiver_count() > 0 {
            self.send(state);
        }
    }

    fn send(&self, state: &State) {
        match serde_json::to_value(&state.context) {
            Ok(snapshot) => {
                self.publisher.send_replace(snapshot);
            }
            Err(e) => error!(error = %e, "failed to serialise execution context"),
        }
    }
}
