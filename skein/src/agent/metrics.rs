//! Agent-level run counters.

use std::time::Duration;

/// Accumulated metrics across an agent's runs.
#[derive(Clone, Debug, Default)]
pub struct AgentMetrics {
    pub total_runs: u64,
    pub total_errors: u64,
    pub total_duration: Duration,
    /// Moving average over all runs.
    pub avg_duration: Duration,
}

impl AgentMetrics {
    pub fn record_run(&mut self, duration: Duration, success: bool) {
        self.total_runs += 1;
        if !success {
            self.total_errors += 1;
        }
        self.total_duration += duration;
        self.avg_duration = self.total_duration / self.total_runs as u32;
    }
}
