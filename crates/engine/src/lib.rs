//! `engine` crate: workflow models, graph construction, branch selection and the execution engine.

pub mod branch;
pub mod cancel;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod graph;
pub mod models;

mod dispatch;

pub use cancel::CancellationController;
pub use config::EngineConfig;
pub use context::{ExecutionContext, ExecutionStats, LogEntry, NodeStatus};
pub use dispatch::PerformanceTier;
pub use error::EngineError;
pub use executor::{RunStatus, RunSummary, WorkflowEngine};
pub use graph::{ExecutionGraph, GraphIssue};
pub use models::{NodeKind, Workflow, WorkflowEdge, WorkflowNode};

#[cfg(test)]
mod executor_tests;
