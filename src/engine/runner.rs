// Mon Oct 19 2026 - Alex

use crate::engine::error::PipelineError;
use crate::engine::params::{JobOutput, JobParams};
use crate::engine::result::BatchOutcome;
use crate::engine::stage::StageKind;
use crate::grid::ConfigError;
use rayon::prelude::*;
use std::time::Instant;

/// In-process batch function used by the local runner.
pub type WorkerFn<'a> = dyn Fn(&JobParams) -> Result<JobOutput, PipelineError> + Sync + 'a;

/// Runs one stage's batches and reports one outcome per batch, in batch
/// order. Runners never retry; that is the scheduler's job.
pub trait JobRunner: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, stage: StageKind, batches: &[(usize, JobParams)], worker: &WorkerFn) -> Vec<BatchOutcome>;
}

/// Runs batches on a dedicated rayon pool inside this process.
pub struct LocalJobRunner {
    pool: rayon::ThreadPool,
}

impl LocalJobRunner {
    pub fn new(threads: usize) -> Result<Self, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("extract-worker-{}", i))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("cannot start worker pool: {}", e)))?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl JobRunner for LocalJobRunner {
    fn name(&self) -> &str {
        "local"
    }

    fn run(&self, stage: StageKind, batches: &[(usize, JobParams)], worker: &WorkerFn) -> Vec<BatchOutcome> {
        log::debug!("{}: running {} batches on {} threads", stage, batches.len(), self.threads());
        self.pool.install(|| {
            batches
                .par_iter()
                .map(|(batch_id, params)| {
                    let start = Instant::now();
                    let result = worker(params);
                    BatchOutcome::new(*batch_id, result, start.elapsed())
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::params::CombineJobParams;
    use std::collections::BTreeMap;

    #[test]
    fn test_outcomes_in_batch_order() {
        let runner = LocalJobRunner::new(4).unwrap();
        let batches: Vec<(usize, JobParams)> = (0..16)
            .map(|i| (i, JobParams::Combine(CombineJobParams { buckets: vec![i as u32] })))
            .collect();
        let worker = |params: &JobParams| match params {
            JobParams::Combine(p) if p.buckets[0] % 5 == 3 => Err(PipelineError::bucket(p.buckets[0], "boom")),
            JobParams::Combine(p) => Ok(JobOutput::Combine {
                objects: BTreeMap::from([(p.buckets[0], 1)]),
            }),
            _ => unreachable!(),
        };
        let outcomes = runner.run(StageKind::Combine, &batches, &worker);

        assert_eq!(outcomes.len(), 16);
        assert!(outcomes.iter().enumerate().all(|(i, o)| o.batch_id == i));
        let failed: Vec<usize> = outcomes.iter().filter(|o| o.is_error()).map(|o| o.batch_id).collect();
        assert_eq!(failed, vec![3, 8, 13]);
    }
}
