//! `device-flow` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`: check a workflow JSON file without running it.
//! - `simulate`: run a workflow JSON file against a mock device.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use engine::{EngineConfig, ExecutionContext, GraphIssue, LogEntry, RunStatus, Workflow, WorkflowEngine};
use nodes::mock::MockDevice;
use nodes::NodeRegistry;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "device-flow",
    about = "Run device automation workflows",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Execute a workflow against a simulated device.
    Simulate {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// Device key passed to every device operation.
        #[arg(long, env = "DEVICE_FLOW_DEVICE", default_value = "mock-device")]
        device: String,
        /// Abort a run once a node is entered this many times beyond what
        /// its counted loops account for.
        #[arg(long, env = "DEVICE_FLOW_MAX_VISITS")]
        max_visits: Option<u32>,
        /// Simulated latency of each device gesture, in milliseconds.
        #[arg(long, default_value_t = 0)]
        latency_ms: u64,
        /// Result reported by every condition check.
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        condition: bool,
        /// Print the final execution context as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => validate(&path),
        Command::Simulate {
            path,
            device,
            max_visits,
            latency_ms,
            condition,
            json,
        } => {
            let mut config = EngineConfig::default();
            if let Some(limit) = max_visits {
                config.max_visits_per_node = limit;
            }
            let mut mock = MockDevice::new().with_default_condition(condition);
            if latency_ms > 0 {
                mock = mock.with_latency(Duration::from_millis(latency_ms));
            }
            simulate(&path, &device, mock, config, json).await
        }
    }
}

fn load(path: &Path) -> anyhow::Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let workflow = load(path)?;
    let registry = NodeRegistry::builtin();
    let mut errors = 0;

    let issues = engine::graph::check(&workflow.nodes, &workflow.edges);
    for issue in &issues {
        print_issue(issue);
        if issue.is_error() {
            errors += 1;
        }
    }

    for node in &workflow.nodes {
        let Some(handler) = registry.get(node.kind) else {
            eprintln!("❌ {}: no handler for '{}' nodes", node.id, node.kind);
            errors += 1;
            continue;
        };
        match handler.validate(&node.config) {
            Ok(validation) => {
                for warning in validation.warnings {
                    println!("⚠️  {}: {warning}", node.id);
                }
            }
            Err(e) => {
                eprintln!("❌ {}: {e}", node.id);
                errors += 1;
            }
        }
    }

    if errors > 0 {
        eprintln!("❌ Validation failed with {errors} error(s)");
        std::process::exit(1);
    }
    println!(
        "✅ Workflow is valid: {} nodes, {} edges",
        workflow.nodes.len(),
        workflow.edges.len()
    );
    Ok(())
}

fn print_issue(issue: &GraphIssue) {
    if issue.is_error() {
        eprintln!("❌ {issue}");
    } else {
        println!("⚠️  {issue}");
    }
}

async fn simulate(
    path: &Path,
    device_key: &str,
    device: MockDevice,
    config: EngineConfig,
    json: bool,
) -> anyhow::Result<()> {
    let workflow = load(path)?;
    let engine = WorkflowEngine::new(Arc::new(device), config);
    info!(workflow = %workflow.name, device = %device_key, "simulating workflow");

    // Stream log entries as snapshots arrive. A snapshot carries the whole
    // log, so entries coalesced by the channel are still printed once.
    let printed = Arc::new(AtomicUsize::new(0));
    let mut rx = engine.subscribe();
    let printer = {
        let printed = printed.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                print_new_entries(&snapshot, &printed);
            }
        })
    };

    let result = engine
        .execute_workflow(&workflow.nodes, &workflow.edges, device_key)
        .await;

    printer.abort();
    // The printer must be gone before the remainder is printed.
    let _ = printer.await;
    let context = engine.get_context();
    let snapshot = serde_json::to_value(&context).context("cannot serialise execution context")?;
    print_new_entries(&snapshot, &printed);
    print_summary(&engine, &context);

    if json {
        println!("{}", serde_json::to_string_pretty(&context)?);
    }

    match result {
        Ok(summary) if summary.status == RunStatus::Stopped => {
            warn!("workflow was stopped before completion");
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(e) => bail!("workflow failed: {e}"),
    }
}

fn print_new_entries(snapshot: &Value, printed: &AtomicUsize) {
    let Some(log) = snapshot.get("executionLog").and_then(Value::as_array) else {
        return;
    };
    let from = printed.load(Ordering::SeqCst);
    for raw in log.iter().skip(from) {
        match serde_json::from_value::<LogEntry>(raw.clone()) {
            Ok(entry) => print_entry(&entry),
            Err(e) => warn!(error = %e, "unreadable log entry"),
        }
    }
    printed.fetch_max(log.len(), Ordering::SeqCst);
}

fn print_entry(entry: &LogEntry) {
    let duration = entry
        .duration
        .map(|ms| format!(" ({ms}ms)"))
        .unwrap_or_default();
    println!(
        "{} [{:>7}] {:<12} {}{duration}",
        entry.timestamp.format("%H:%M:%S%.3f"),
        format!("{:?}", entry.status).to_lowercase(),
        entry.node_id,
        entry.message,
    );
}

fn print_summary(engine: &WorkflowEngine, context: &ExecutionContext) {
    let stats = engine.stats();
    println!();
    println!(
        "nodes: {} total, {} executed, {} succeeded, {} failed, {} skipped",
        stats.total_nodes,
        stats.executed_nodes,
        stats.success_nodes,
        stats.error_nodes,
        stats.skipped_nodes
    );
    if !context.variables.is_empty() {
        println!("variables: {}", Value::Object(context.variables.clone()));
    }
}
