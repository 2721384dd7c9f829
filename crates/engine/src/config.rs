//! Engine configuration.

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often a single node may be entered in one run, on top of what the
    /// workflow's counted loops can legitimately cause, before the run is
    /// aborted as a runaway cycle.
    ///
    /// Each counted loop of `n` passes raises the bound by a factor of
    /// `n + 1`, so nested loops of any configured count always finish.
    pub max_visits_per_node: u32,
    /// Node id used for workflow-level log entries. Entries under this id
    /// never touch per-node statuses or stats.
    pub workflow_log_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_visits_per_node: 1_000,
            workflow_log_id: "workflow".to_string(),
        }
    }
}
