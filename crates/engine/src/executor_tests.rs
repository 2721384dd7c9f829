//! Behaviour tests for the workflow engine.
//!
//! These run whole workflows against `MockDevice` and assert on the
//! execution log, node statuses, stats and the calls the device received.

use std::sync::Arc;
use std::time::Duration;

use nodes::handlers::loop_counter_key;
use nodes::mock::{MockDevice, Operation};
use nodes::{NodeRegistry, OperationError};
use serde_json::{json, Value};

use crate::{
    CancellationController, EngineConfig, EngineError, ExecutionContext, NodeKind, NodeStatus,
    RunStatus, WorkflowEdge, WorkflowEngine, WorkflowNode,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn start() -> WorkflowNode {
    WorkflowNode::new("start", NodeKind::Start, "Start")
}

fn click(id: &str) -> WorkflowNode {
    WorkflowNode::new(id, NodeKind::Click, format!("Tap {id}"))
        .with_config(json!({ "selector": format!("#{id}") }))
}

fn condition(id: &str) -> WorkflowNode {
    WorkflowNode::new(id, NodeKind::Condition, "Check").with_config(json!({ "selector": "#banner" }))
}

fn engine_with(device: MockDevice) -> (Arc<MockDevice>, WorkflowEngine) {
    engine_with_config(device, EngineConfig::default())
}

fn engine_with_config(device: MockDevice, config: EngineConfig) -> (Arc<MockDevice>, WorkflowEngine) {
    let device = Arc::new(device);
    let engine = WorkflowEngine::new(device.clone(), config);
    (device, engine)
}

/// Node ids in the order they entered `running`, workflow entries excluded.
fn run_order(ctx: &ExecutionContext) -> Vec<String> {
    ctx.execution_log
        .iter()
        .filter(|e| e.node_id != "workflow" && e.status == NodeStatus::Running)
        .map(|e| e.node_id.clone())
        .collect()
}

fn statuses_of(ctx: &ExecutionContext, node_id: &str) -> Vec<NodeStatus> {
    ctx.execution_log
        .iter()
        .filter(|e| e.node_id == node_id)
        .map(|e| e.status)
        .collect()
}

/// Selectors of every click the device received, in order.
fn clicked(device: &MockDevice) -> Vec<String> {
    device
        .calls()
        .into_iter()
        .filter(|c| c.operation == Operation::Click)
        .filter_map(|c| c.detail["selector"].as_str().map(str::to_owned))
        .collect()
}

// ============================================================
// Traversal
// ============================================================

#[tokio::test]
async fn single_path_runs_each_node_in_order() {
    let (device, engine) = engine_with(MockDevice::new());
    let nodes = vec![start(), click("a"), click("b")];
    let edges = vec![WorkflowEdge::new("start", "a"), WorkflowEdge::new("a", "b")];

    let summary = engine
        .execute_workflow(&nodes, &edges, "emulator-5554")
        .await
        .expect("run should succeed");

    let ctx = engine.get_context();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(run_order(&ctx), vec!["start", "a", "b"]);
    for id in ["start", "a", "b"] {
        assert_eq!(statuses_of(&ctx, id), vec![NodeStatus::Running, NodeStatus::Success]);
    }
    assert!(!ctx.is_running);
    assert!(!engine.is_running());
    assert_eq!(ctx.current_node_id, None);

    assert_eq!(summary.stats.total_nodes, 2);
    assert_eq!(summary.stats.executed_nodes, 2);
    assert_eq!(summary.stats.success_nodes, 2);
    assert_eq!(summary.stats.error_nodes, 0);
    assert_eq!(clicked(&device), vec!["#a", "#b"]);
    assert!(device.calls().iter().all(|c| c.device_key == "emulator-5554"));
}

#[tokio::test]
async fn fan_out_runs_depth_first_in_edge_order() {
    //   start
    //   /   \
    //  a     b
    //  |
    //  a1
    let (device, engine) = engine_with(MockDevice::new());
    let nodes = vec![start(), click("a"), click("b"), click("a1")];
    let edges = vec![
        WorkflowEdge::new("start", "a"),
        WorkflowEdge::new("start", "b"),
        WorkflowEdge::new("a", "a1"),
    ];

    engine.execute_workflow(&nodes, &edges, "d").await.unwrap();

    assert_eq!(run_order(&engine.get_context()), vec!["start", "a", "a1", "b"]);
    assert_eq!(clicked(&device), vec!["#a", "#a1", "#b"]);
}

#[tokio::test]
async fn nodes_reached_twice_run_twice() {
    //   start
    //   /   \
    //  a     b
    //   \   /
    //     d
    let (_, engine) = engine_with(MockDevice::new());
    let nodes = vec![start(), click("a"), click("b"), click("d")];
    let edges = vec![
        WorkflowEdge::new("start", "a"),
        WorkflowEdge::new("start", "b"),
        WorkflowEdge::new("a", "d"),
        WorkflowEdge::new("b", "d"),
    ];

    let summary = engine.execute_workflow(&nodes, &edges, "d").await.unwrap();

    assert_eq!(run_order(&engine.get_context()), vec!["start", "a", "d", "b", "d"]);
    assert_eq!(summary.stats.executed_nodes, 3);
    assert_eq!(summary.stats.success_nodes, 4);
}

#[tokio::test]
async fn dangling_edges_are_ignored_at_run_time() {
    let (_, engine) = engine_with(MockDevice::new());
    let nodes = vec![start(), click("a")];
    let edges = vec![WorkflowEdge::new("start", "ghost"), WorkflowEdge::new("start", "a")];

    engine.execute_workflow(&nodes, &edges, "d").await.unwrap();
    assert_eq!(run_order(&engine.get_context()), vec!["start", "a"]);
}

// ============================================================
// Branching
// ============================================================

fn branching_workflow() -> (Vec<WorkflowNode>, Vec<WorkflowEdge>) {
    let nodes = vec![start(), condition("c"), click("t"), click("f")];
    let edges = vec![
        WorkflowEdge::new("start", "c"),
        WorkflowEdge::labelled("c", "t", "true"),
        WorkflowEdge::labelled("c", "f", "false"),
    ];
    (nodes, edges)
}

#[tokio::test]
async fn true_condition_follows_only_the_true_edge() {
    let (device, engine) = engine_with(MockDevice::new().with_default_condition(true));
    let (nodes, edges) = branching_workflow();

    let summary = engine.execute_workflow(&nodes, &edges, "d").await.unwrap();
    let ctx = engine.get_context();

    assert_eq!(run_order(&ctx), vec!["start", "c", "t"]);
    assert!(ctx.execution_log.iter().all(|e| e.node_id != "f"));
    assert_eq!(ctx.node_statuses["f"], NodeStatus::Pending);
    assert_eq!(clicked(&device), vec!["#t"]);
    assert_eq!(summary.stats.skipped_nodes, 1);
}

#[tokio::test]
async fn false_condition_follows_only_the_false_edge() {
    let (device, engine) = engine_with(MockDevice::new().with_default_condition(false));
    let (nodes, edges) = branching_workflow();

    engine.execute_workflow(&nodes, &edges, "d").await.unwrap();

    assert_eq!(run_order(&engine.get_context()), vec!["start", "c", "f"]);
    assert_eq!(clicked(&device), vec!["#f"]);
}

#[tokio::test]
async fn failed_condition_check_continues_on_the_false_edge() {
    let device = MockDevice::new()
        .with_condition_results([Err(OperationError::new("element lookup timed out"))]);
    let (device, engine) = engine_with(device);
    let (nodes, edges) = branching_workflow();

    let summary = engine.execute_workflow(&nodes, &edges, "d").await;

    assert!(summary.is_ok());
    let ctx = engine.get_context();
    assert_eq!(run_order(&ctx), vec!["start", "c", "f"]);
    assert_eq!(ctx.node_statuses["c"], NodeStatus::Success);
    assert_eq!(clicked(&device), vec!["#f"]);

    let success = ctx
        .execution_log
        .iter()
        .find(|e| e.node_id == "c" && e.status == NodeStatus::Success)
        .unwrap();
    let details = success.details.as_ref().unwrap();
    assert_eq!(details["result"], json!(false));
    assert_eq!(details["checkError"], json!("element lookup timed out"));
}

#[tokio::test]
async fn counted_loop_repeats_its_body() {
    // start → loop ⇄ body, loop --end--> done
    let (device, engine) = engine_with(MockDevice::new());
    let nodes = vec![
        start(),
        WorkflowNode::new("loop", NodeKind::Loop, "Repeat")
            .with_config(json!({ "loopType": "count", "count": 2 })),
        click("body"),
        click("done"),
    ];
    let edges = vec![
        WorkflowEdge::new("start", "loop"),
        WorkflowEdge::labelled("loop", "body", "loop"),
        WorkflowEdge::labelled("loop", "done", "end"),
        WorkflowEdge::new("body", "loop"),
    ];

    let summary = engine.execute_workflow(&nodes, &edges, "d").await.unwrap();
    let ctx = engine.get_context();

    assert_eq!(
        run_order(&ctx),
        vec!["start", "loop", "body", "loop", "body", "loop", "done"]
    );
    assert_eq!(clicked(&device), vec!["#body", "#body", "#done"]);
    assert!(!ctx.variables.contains_key(&loop_counter_key("loop")));
    assert_eq!(summary.stats.executed_nodes, 3);
    assert_eq!(summary.stats.skipped_nodes, 0);
}

#[tokio::test]
async fn runaway_cycle_hits_the_visit_limit() {
    let config = EngineConfig {
        max_visits_per_node: 3,
        ..EngineConfig::default()
    };
    let (device, engine) = engine_with_config(MockDevice::new(), config);
    let nodes = vec![start(), click("a"), click("b")];
    let edges = vec![
        WorkflowEdge::new("start", "a"),
        WorkflowEdge::new("a", "b"),
        WorkflowEdge::new("b", "a"),
    ];

    let err = engine.execute_workflow(&nodes, &edges, "d").await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::VisitLimitExceeded { ref node_id, limit: 3 } if node_id == "a"
    ));
    assert_eq!(device.call_count(Operation::Click), 6);
    assert!(!engine.get_context().is_running);
}

fn counted_loop(id: &str, count: u32) -> WorkflowNode {
    WorkflowNode::new(id, NodeKind::Loop, format!("Repeat {id}"))
        .with_config(json!({ "loopType": "count", "count": count }))
}

#[tokio::test]
async fn loop_count_above_the_visit_limit_still_finishes() {
    let config = EngineConfig {
        max_visits_per_node: 10,
        ..EngineConfig::default()
    };
    let (device, engine) = engine_with_config(MockDevice::new(), config);
    let nodes = vec![start(), counted_loop("l", 50), click("body"), click("done")];
    let edges = vec![
        WorkflowEdge::new("start", "l"),
        WorkflowEdge::labelled("l", "body", "loop"),
        WorkflowEdge::labelled("l", "done", "end"),
        WorkflowEdge::new("body", "l"),
    ];

    let summary = engine.execute_workflow(&nodes, &edges, "d").await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(device.call_count(Operation::Click), 51);
    assert_eq!(clicked(&device).last().map(String::as_str), Some("#done"));
}

#[tokio::test]
async fn nested_loops_multiply_their_allowance() {
    // start → outer ⇄ inner ⇄ body; inner --end--> outer
    let config = EngineConfig {
        max_visits_per_node: 2,
        ..EngineConfig::default()
    };
    let (device, engine) = engine_with_config(MockDevice::new(), config);
    let nodes = vec![
        start(),
        counted_loop("outer", 3),
        counted_loop("inner", 4),
        click("body"),
    ];
    let edges = vec![
        WorkflowEdge::new("start", "outer"),
        WorkflowEdge::labelled("outer", "inner", "loop"),
        WorkflowEdge::labelled("inner", "body", "loop"),
        WorkflowEdge::labelled("inner", "outer", "end"),
        WorkflowEdge::new("body", "inner"),
    ];

    let summary = engine.execute_workflow(&nodes, &edges, "d").await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(device.call_count(Operation::Click), 12);
    assert!(engine.get_context().variables.is_empty());
}

#[tokio::test]
async fn runaway_cycle_beside_a_loop_is_still_bounded() {
    // The loop raises the bound to 2 + (1 + 1) = 4; the a ⇄ b cycle never ends.
    let config = EngineConfig {
        max_visits_per_node: 2,
        ..EngineConfig::default()
    };
    let (_, engine) = engine_with_config(MockDevice::new(), config);
    let nodes = vec![start(), counted_loop("l", 1), click("x"), click("a"), click("b")];
    let edges = vec![
        WorkflowEdge::new("start", "l"),
        WorkflowEdge::labelled("l", "x", "loop"),
        WorkflowEdge::new("x", "l"),
        WorkflowEdge::labelled("l", "a", "end"),
        WorkflowEdge::new("a", "b"),
        WorkflowEdge::new("b", "a"),
    ];

    let err = engine.execute_workflow(&nodes, &edges, "d").await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::VisitLimitExceeded { ref node_id, limit: 4 } if node_id == "a"
    ));
}

// ============================================================
// Stopping
// ============================================================

#[tokio::test]
async fn stop_during_a_node_prevents_later_nodes() {
    let cancel = CancellationController::new();
    let trigger = cancel.clone();
    let device = MockDevice::new().on(Operation::Click, move || trigger.stop());
    let (device, engine) = engine_with(device);
    let engine = engine.with_cancellation(cancel);

    let nodes = vec![start(), click("a"), click("b")];
    let edges = vec![WorkflowEdge::new("start", "a"), WorkflowEdge::new("a", "b")];

    let summary = engine.execute_workflow(&nodes, &edges, "d").await.unwrap();
    let ctx = engine.get_context();

    assert_eq!(summary.status, RunStatus::Stopped);
    assert_eq!(run_order(&ctx), vec!["start", "a"]);
    assert_eq!(ctx.node_statuses["a"], NodeStatus::Success);
    assert_eq!(ctx.node_statuses["b"], NodeStatus::Pending);
    assert_eq!(clicked(&device), vec!["#a"]);

    let last = ctx.execution_log.last().unwrap();
    assert_eq!(last.node_id, "workflow");
    assert!(last.message.contains("stopped by user"));
    assert!(!ctx.is_running);
}

#[tokio::test(start_paused = true)]
async fn stop_from_another_task_takes_effect_after_the_current_node() {
    let device = MockDevice::new().with_latency(Duration::from_millis(50));
    let (device, engine) = engine_with(device);
    let engine = Arc::new(engine);

    let nodes = vec![start(), click("a"), click("b")];
    let edges = vec![WorkflowEdge::new("start", "a"), WorkflowEdge::new("a", "b")];

    let runner = engine.clone();
    let run = tokio::spawn(async move { runner.execute_workflow(&nodes, &edges, "d").await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(engine.is_running());
    assert_eq!(engine.get_context().current_node_id.as_deref(), Some("a"));
    assert!(engine.stop_execution());

    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.status, RunStatus::Stopped);
    assert_eq!(clicked(&device), vec!["#a"]);
    assert!(!engine.get_context().is_running);
    assert!(!engine.stop_execution());
}

#[tokio::test]
async fn stop_flag_does_not_outlive_its_run() {
    let cancel = CancellationController::new();
    let trigger = cancel.clone();
    let device = MockDevice::new().on(Operation::Click, move || trigger.stop());
    let (device, engine) = engine_with(device);
    let engine = engine.with_cancellation(cancel.clone());

    let nodes = vec![start(), click("a"), click("b")];
    let edges = vec![WorkflowEdge::new("start", "a"), WorkflowEdge::new("a", "b")];

    let summary = engine.execute_workflow(&nodes, &edges, "d").await.unwrap();
    assert_eq!(summary.status, RunStatus::Stopped);
    assert!(!cancel.is_stopped());

    // A stop raised while idle does not cancel the next run either.
    cancel.stop();
    let nodes = vec![
        start(),
        WorkflowNode::new("pause", NodeKind::Wait, "Pause").with_config(json!({ "duration": 0 })),
    ];
    let edges = vec![WorkflowEdge::new("start", "pause")];
    let summary = engine.execute_workflow(&nodes, &edges, "d").await.unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(device.call_count(Operation::Wait), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_runs_are_rejected_without_touching_the_context() {
    let device = MockDevice::new().with_latency(Duration::from_millis(50));
    let (_, engine) = engine_with(device);
    let engine = Arc::new(engine);

    let nodes = vec![start(), click("a")];
    let edges = vec![WorkflowEdge::new("start", "a")];

    let runner = engine.clone();
    let (n, e) = (nodes.clone(), edges.clone());
    let run = tokio::spawn(async move { runner.execute_workflow(&n, &e, "d").await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    let before = engine.get_context();

    let second = engine.execute_workflow(&nodes, &edges, "d").await;
    assert!(matches!(second, Err(EngineError::AlreadyRunning)));
    let single = engine.execute_single_node(&click("x"), "d").await;
    assert!(matches!(single, Err(EngineError::AlreadyRunning)));
    assert_eq!(engine.get_context(), before);

    assert!(run.await.unwrap().is_ok());
    assert!(!engine.is_running());
}

// ============================================================
// Failures
// ============================================================

#[tokio::test]
async fn missing_start_node_fails_before_any_node_runs() {
    let (device, engine) = engine_with(MockDevice::new());
    let nodes = vec![click("a")];

    let err = engine.execute_workflow(&nodes, &[], "d").await.unwrap_err();
    let ctx = engine.get_context();

    assert!(matches!(err, EngineError::StartNodeNotFound));
    assert_eq!(err.to_string(), "Start node not found");
    assert!(ctx.execution_log.iter().all(|e| e.node_id == "workflow"));
    assert_eq!(ctx.execution_log[0].status, NodeStatus::Running);
    assert_eq!(ctx.execution_log.last().unwrap().status, NodeStatus::Error);
    assert!(!ctx.is_running);
    assert!(device.calls().is_empty());
}

#[tokio::test]
async fn missing_required_field_aborts_before_the_device_call() {
    let (device, engine) = engine_with(MockDevice::new());
    let nodes = vec![
        start(),
        WorkflowNode::new("type", NodeKind::Input, "Type name").with_config(json!({ "text": "Ada" })),
        click("after"),
    ];
    let edges = vec![
        WorkflowEdge::new("start", "type"),
        WorkflowEdge::new("type", "after"),
    ];

    let err = engine.execute_workflow(&nodes, &edges, "d").await.unwrap_err();
    let ctx = engine.get_context();

    assert_eq!(err.kind(), "configuration_error");
    assert_eq!(statuses_of(&ctx, "type"), vec![NodeStatus::Error]);
    assert!(statuses_of(&ctx, "after").is_empty());
    assert_eq!(device.call_count(Operation::Input), 0);

    let node_error = ctx
        .execution_log
        .iter()
        .find(|e| e.node_id == "type")
        .and_then(|e| e.details.clone())
        .unwrap();
    assert!(node_error["suggestion"].as_str().unwrap().contains("selector"));

    let workflow_error = ctx.execution_log.last().unwrap();
    assert_eq!(workflow_error.node_id, "workflow");
    let details = workflow_error.details.as_ref().unwrap();
    assert_eq!(details["errorKind"], json!("configuration_error"));
    assert_eq!(details["nodeId"], json!("type"));
    assert_eq!(engine.stats().error_nodes, 1);
}

#[tokio::test]
async fn device_failure_aborts_the_run() {
    let (_, engine) = engine_with(MockDevice::new().failing(Operation::Click, "device offline"));
    let nodes = vec![start(), click("a"), click("b")];
    let edges = vec![WorkflowEdge::new("start", "a"), WorkflowEdge::new("a", "b")];

    let err = engine.execute_workflow(&nodes, &edges, "d").await.unwrap_err();
    let ctx = engine.get_context();

    assert!(matches!(err, EngineError::Operation { ref node_id, .. } if node_id == "a"));
    assert_eq!(statuses_of(&ctx, "a"), vec![NodeStatus::Running, NodeStatus::Error]);
    assert_eq!(ctx.node_statuses["b"], NodeStatus::Pending);

    let failed = ctx
        .execution_log
        .iter()
        .find(|e| e.node_id == "a" && e.status == NodeStatus::Error)
        .unwrap();
    assert!(failed.duration.is_some());
    let details = failed.details.as_ref().unwrap();
    assert_eq!(details["errorKind"], json!("operation_error"));
    assert_eq!(details["operationKind"], json!("mock_failure"));
    assert!(details.contains_key("suggestion"));
}

#[tokio::test]
async fn unregistered_kind_aborts_the_run() {
    let engine = WorkflowEngine::with_registry(
        Arc::new(MockDevice::new()),
        NodeRegistry::empty(),
        EngineConfig::default(),
    );
    let nodes = vec![start()];

    let err = engine.execute_workflow(&nodes, &[], "d").await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownNodeKind { kind: NodeKind::Start, .. }));
    assert_eq!(engine.get_context().node_statuses["start"], NodeStatus::Error);
}

// ============================================================
// Single-node runs
// ============================================================

#[tokio::test]
async fn single_node_run_only_touches_its_own_status() {
    let (device, engine) = engine_with(MockDevice::new());
    let nodes = vec![start(), click("a"), click("b")];
    let edges = vec![WorkflowEdge::new("start", "a"), WorkflowEdge::new("a", "b")];
    engine.execute_workflow(&nodes, &edges, "d").await.unwrap();
    let before = engine.get_context().node_statuses;

    let summary = engine.execute_single_node(&click("x"), "d").await.unwrap();
    let ctx = engine.get_context();

    for id in ["start", "a", "b"] {
        assert_eq!(ctx.node_statuses[id], before[id]);
    }
    assert_eq!(ctx.node_statuses["x"], NodeStatus::Success);
    assert!(ctx
        .execution_log
        .iter()
        .all(|e| e.node_id == "x" || e.node_id == "workflow"));
    assert_eq!(summary.stats.total_nodes, 1);
    assert_eq!(summary.stats.success_nodes, 1);
    assert_eq!(clicked(&device), vec!["#a", "#b", "#x"]);
    assert!(!ctx.is_running);
}

#[tokio::test]
async fn single_node_run_ignores_outgoing_branches() {
    let (device, engine) = engine_with(MockDevice::new().with_default_condition(true));

    let summary = engine.execute_single_node(&condition("c"), "d").await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(device.call_count(Operation::CheckCondition), 1);
    assert_eq!(device.call_count(Operation::Click), 0);
}

// ============================================================
// Log content and progress push
// ============================================================

#[tokio::test]
async fn configuration_warnings_are_logged_and_execution_continues() {
    let (device, engine) = engine_with(MockDevice::new());
    let nodes = vec![start(), WorkflowNode::new("pause", NodeKind::Wait, "Pause")];
    let edges = vec![WorkflowEdge::new("start", "pause")];

    engine.execute_workflow(&nodes, &edges, "d").await.unwrap();
    let ctx = engine.get_context();

    let running = ctx
        .execution_log
        .iter()
        .find(|e| e.node_id == "pause" && e.status == NodeStatus::Running)
        .unwrap();
    let details = running.details.as_ref().unwrap();
    assert_eq!(details["duration"], json!(1000));
    assert_eq!(details["warnings"].as_array().unwrap().len(), 1);
    assert_eq!(device.call_count(Operation::Wait), 1);
}

#[tokio::test]
async fn unusable_optional_fields_fall_back_instead_of_failing() {
    let (device, engine) = engine_with(MockDevice::new());
    let nodes = vec![
        start(),
        WorkflowNode::new("pause", NodeKind::Wait, "Pause").with_config(json!({ "duration": -500 })),
        WorkflowNode::new("tap", NodeKind::Click, "Tap")
            .with_config(json!({ "selector": "#go", "timeout": -1 })),
        WorkflowNode::new("check", NodeKind::Condition, "Check")
            .with_config(json!({ "selector": "#ok", "conditionType": "visible" })),
    ];
    let edges = vec![
        WorkflowEdge::new("start", "pause"),
        WorkflowEdge::new("pause", "tap"),
        WorkflowEdge::new("tap", "check"),
    ];

    let summary = engine.execute_workflow(&nodes, &edges, "d").await.unwrap();
    let ctx = engine.get_context();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.stats.error_nodes, 0);
    for id in ["pause", "tap", "check"] {
        let running = ctx
            .execution_log
            .iter()
            .find(|e| e.node_id == id && e.status == NodeStatus::Running)
            .unwrap();
        let warnings = running.details.as_ref().unwrap()["warnings"].as_array().unwrap();
        assert_eq!(warnings.len(), 1, "node {id}");
    }
    assert_eq!(device.call_count(Operation::Wait), 1);
    assert_eq!(clicked(&device), vec!["#go"]);
}

#[tokio::test]
async fn success_entries_carry_performance_and_handler_notes() {
    let (_, engine) = engine_with(MockDevice::new());
    let nodes = vec![
        start(),
        WorkflowNode::new("shot", NodeKind::Screenshot, "Capture")
            .with_config(json!({ "filename": "home.png" })),
    ];
    let edges = vec![WorkflowEdge::new("start", "shot")];

    engine.execute_workflow(&nodes, &edges, "d").await.unwrap();
    let ctx = engine.get_context();

    let done = ctx
        .execution_log
        .iter()
        .find(|e| e.node_id == "shot" && e.status == NodeStatus::Success)
        .unwrap();
    let details = done.details.as_ref().unwrap();
    assert_eq!(details["performance"], json!("Fast"));
    assert!(details["path"].as_str().unwrap().ends_with("home.png"));
    assert!(details.contains_key("fileSize"));
    assert!(done.duration.is_some());
}

#[tokio::test]
async fn unnamed_screenshot_logs_the_name_it_was_saved_under() {
    let (_, engine) = engine_with(MockDevice::new());
    let nodes = vec![start(), WorkflowNode::new("shot", NodeKind::Screenshot, "Capture")];
    let edges = vec![WorkflowEdge::new("start", "shot")];

    engine.execute_workflow(&nodes, &edges, "d").await.unwrap();
    let ctx = engine.get_context();

    let details_of = |status| {
        ctx.execution_log
            .iter()
            .find(|e| e.node_id == "shot" && e.status == status)
            .and_then(|e| e.details.clone())
            .unwrap()
    };
    assert!(!details_of(NodeStatus::Running).contains_key("filename"));

    let done = details_of(NodeStatus::Success);
    let filename = done["filename"].as_str().unwrap();
    assert!(filename.starts_with("screenshot_"));
    assert!(done["path"].as_str().unwrap().ends_with(filename));
}

#[tokio::test]
async fn subscribers_see_the_terminal_snapshot() {
    let (_, engine) = engine_with(MockDevice::new());
    let mut rx = engine.subscribe();
    let nodes = vec![start(), click("a")];
    let edges = vec![WorkflowEdge::new("start", "a")];

    engine.execute_workflow(&nodes, &edges, "d").await.unwrap();

    assert!(rx.has_changed().unwrap());
    let snapshot: Value = rx.borrow_and_update().clone();
    let ctx = engine.get_context();
    assert_eq!(snapshot["isRunning"], json!(false));
    assert_eq!(
        snapshot["executionLog"].as_array().unwrap().len(),
        ctx.execution_log.len()
    );
    assert_eq!(snapshot["nodeStatuses"]["a"], json!("success"));
    assert!(snapshot["executionLog"][0]["timestamp"].is_string());
}

#[tokio::test]
async fn late_subscribers_start_from_the_current_context() {
    let (_, engine) = engine_with(MockDevice::new());
    assert_eq!(*engine.subscribe().borrow(), Value::Null);

    let nodes = vec![start(), click("a")];
    let edges = vec![WorkflowEdge::new("start", "a")];
    engine.execute_workflow(&nodes, &edges, "d").await.unwrap();

    let rx = engine.subscribe();
    let snapshot = rx.borrow().clone();
    assert_eq!(snapshot["isRunning"], json!(false));
    assert_eq!(
        snapshot["executionLog"].as_array().unwrap().len(),
        engine.get_context().execution_log.len()
    );
}

#[tokio::test]
async fn run_slot_is_free_once_the_idle_snapshot_is_seen() {
    let (_, engine) = engine_with(MockDevice::new());
    let engine = Arc::new(engine);
    let mut rx = engine.subscribe();
    let nodes = vec![start(), click("a")];
    let edges = vec![WorkflowEdge::new("start", "a")];

    let runner = engine.clone();
    let (n, e) = (nodes.clone(), edges.clone());
    let run = tokio::spawn(async move { runner.execute_workflow(&n, &e, "d").await });

    loop {
        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        if snapshot["isRunning"] == json!(false) {
            break;
        }
    }
    assert!(!engine.is_running());
    let next = engine.execute_workflow(&nodes, &edges, "d").await;
    assert!(next.is_ok());
    assert!(run.await.unwrap().is_ok());
}

#[tokio::test]
async fn each_workflow_run_starts_from_a_clean_context() {
    let (_, engine) = engine_with(MockDevice::new());
    let nodes = vec![start(), click("a")];
    let edges = vec![WorkflowEdge::new("start", "a")];

    engine.execute_workflow(&nodes, &edges, "d").await.unwrap();
    let first = engine.get_context().execution_log.len();
    engine.execute_workflow(&nodes, &edges, "d").await.unwrap();
    let second = engine.get_context();

    assert_eq!(second.execution_log.len(), first);
    assert_eq!(engine.stats().success_nodes, 1);
}
