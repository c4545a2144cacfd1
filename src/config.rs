use std::path::Path;
use std::time::Duration;
use serde_derive::{Deserialize, Serialize};
use crate::core::Error;

/// Knobs for one solve (or a batch of attempts). Missing fields in JSON take
/// their default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub seed: u64,
    pub deadline_ms: u64,
    pub attempts: u32,
    // Run attempts on separate threads.
    pub parallel: bool,
    // Keep per-reason rejection counts while precomputing spaces.
    pub count_rejections: bool,
    // Emit a trace event for every committed or rolled back step.
    pub trace_steps: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            seed: 0,
            deadline_ms: 2000,
            attempts: 1,
            parallel: false,
            count_rejections: false,
            trace_steps: false,
        }
    }
}

impl SolverConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = deadline.as_millis() as u64;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn from_json_str(s: &str) -> Result<Self, Error> {
        let config: SolverConfig = serde_json::from_str(s)?;
        if config.attempts == 0 {
            return Err(Error::new_const("attempts must be at least 1"));
        }
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let s = std::fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }
}
