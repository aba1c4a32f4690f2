// Mon Oct 19 2026 - Alex

use crate::engine::error::PipelineError;
use crate::engine::params::JobParams;
use crate::engine::result::StageOutcomes;
use crate::engine::runner::{JobRunner, WorkerFn};
use crate::engine::stage::StageKind;
use crate::utils::progress::StageProgress;
use log::{debug, warn};

/// Runs a stage's batches through a runner, re-running failed batches up
/// to `max_retries` times. A batch failing with a non-retryable error
/// aborts the stage at once.
pub struct StageScheduler<'r> {
    runner: &'r dyn JobRunner,
    max_retries: u32,
}

impl<'r> StageScheduler<'r> {
    pub fn new(runner: &'r dyn JobRunner, max_retries: u32) -> Self {
        Self { runner, max_retries }
    }

    pub fn run(
        &self,
        stage: StageKind,
        batches: Vec<JobParams>,
        worker: &WorkerFn,
        progress: &StageProgress,
    ) -> Result<StageOutcomes, PipelineError> {
        let mut outcomes = StageOutcomes::default();
        let mut pending: Vec<(usize, JobParams)> = batches.into_iter().enumerate().collect();
        let mut attempt = 0;

        while !pending.is_empty() {
            debug!(
                "{}: attempt {} with {} batches on the {} runner",
                stage,
                attempt + 1,
                pending.len(),
                self.runner.name()
            );
            let results = self.runner.run(stage, &pending, worker);
            let mut params_by_id: std::collections::BTreeMap<usize, JobParams> = pending.drain(..).collect();

            for outcome in results {
                outcomes.busy += outcome.duration;
                let Some(params) = params_by_id.remove(&outcome.batch_id) else {
                    continue;
                };
                match outcome.result {
                    Ok(output) => {
                        progress.inc(params.item_count() as u64);
                        outcomes.outputs.push((outcome.batch_id, output));
                    }
                    Err(e) if !e.is_retryable() => return Err(e),
                    Err(e) if attempt < self.max_retries => {
                        warn!("{}: batch {} failed, retrying: {}", stage, outcome.batch_id, e);
                        pending.push((outcome.batch_id, params));
                    }
                    Err(e) => {
                        warn!("{}: batch {} failed after {} attempts: {}", stage, outcome.batch_id, attempt + 1, e);
                        outcomes.failures.push((outcome.batch_id, e));
                    }
                }
            }
            // A runner that silently drops a batch gets it scheduled again.
            pending.extend(params_by_id);

            if !pending.is_empty() {
                attempt += 1;
                outcomes.retries += 1;
                if attempt > self.max_retries {
                    for (batch_id, _) in pending.drain(..) {
                        outcomes.failures.push((
                            batch_id,
                            PipelineError::Scheduling {
                                stage,
                                missing: vec![batch_id],
                                detail: "runner reported no outcome".to_string(),
                            },
                        ));
                    }
                }
            }
        }

        outcomes.outputs.sort_by_key(|(id, _)| *id);
        outcomes.failures.sort_by_key(|(id, _)| *id);
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::params::{CombineJobParams, JobOutput};
    use crate::engine::runner::LocalJobRunner;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn batches(n: u32) -> Vec<JobParams> {
        (0..n)
            .map(|b| JobParams::Combine(CombineJobParams { buckets: vec![b] }))
            .collect()
    }

    fn bucket(params: &JobParams) -> u32 {
        match params {
            JobParams::Combine(p) => p.buckets[0],
            _ => unreachable!(),
        }
    }

    fn ok(b: u32) -> Result<JobOutput, PipelineError> {
        Ok(JobOutput::Combine {
            objects: BTreeMap::from([(b, 1)]),
        })
    }

    #[test]
    fn test_flaky_batch_succeeds_on_retry() {
        let runner = LocalJobRunner::new(2).unwrap();
        let calls = AtomicU32::new(0);
        let worker = |p: &JobParams| {
            let b = bucket(p);
            if b == 2 && calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(PipelineError::bucket(b, "transient"));
            }
            ok(b)
        };
        let outcomes = StageScheduler::new(&runner, 2)
            .run(StageKind::Combine, batches(4), &worker, &StageProgress::hidden())
            .unwrap();
        assert_eq!(outcomes.success_count(), 4);
        assert_eq!(outcomes.retries, 1);
        assert_eq!(
            outcomes.outputs.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn test_persistent_failure_reported() {
        let runner = LocalJobRunner::new(2).unwrap();
        let worker = |p: &JobParams| {
            let b = bucket(p);
            if b == 1 {
                Err(PipelineError::bucket(b, "disk gone"))
            } else {
                ok(b)
            }
        };
        let outcomes = StageScheduler::new(&runner, 2)
            .run(StageKind::Combine, batches(3), &worker, &StageProgress::hidden())
            .unwrap();
        assert_eq!(outcomes.success_count(), 2);
        assert_eq!(outcomes.failures.len(), 1);
        assert_eq!(outcomes.failures[0].0, 1);
        assert_eq!(outcomes.retries, 2);
    }

    #[test]
    fn test_config_error_aborts() {
        let runner = LocalJobRunner::new(1).unwrap();
        let worker = |_: &JobParams| -> Result<JobOutput, PipelineError> {
            Err(crate::grid::ConfigError::Invalid("bad".to_string()).into())
        };
        let result = StageScheduler::new(&runner, 5).run(StageKind::Combine, batches(2), &worker, &StageProgress::hidden());
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
