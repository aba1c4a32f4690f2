// Mon Oct 19 2026 - Alex

use crate::engine::error::PipelineError;
use crate::engine::params::JobOutput;
use std::time::Duration;

#[derive(Debug)]
pub struct BatchOutcome {
    pub batch_id: usize,
    pub result: Result<JobOutput, PipelineError>,
    pub duration: Duration,
}

impl BatchOutcome {
    pub fn new(batch_id: usize, result: Result<JobOutput, PipelineError>, duration: Duration) -> Self {
        Self {
            batch_id,
            result,
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn is_error(&self) -> bool {
        self.result.is_err()
    }
}

/// Outcomes of one stage after retries: everything that succeeded plus the
/// last error of every batch that never did.
#[derive(Debug, Default)]
pub struct StageOutcomes {
    pub outputs: Vec<(usize, JobOutput)>,
    pub failures: Vec<(usize, PipelineError)>,
    pub retries: u32,
    pub busy: Duration,
}

impl StageOutcomes {
    pub fn success_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn error_count(&self) -> usize {
        self.failures.len()
    }

    pub fn total_count(&self) -> usize {
        self.outputs.len() + self.failures.len()
    }

    pub fn errors(&self) -> Vec<String> {
        self.failures.iter().map(|(_, e)| e.to_string()).collect()
    }
}
