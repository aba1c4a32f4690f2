// Mon Oct 19 2026 - Alex

pub mod barrier;
pub mod context;
pub mod error;
pub mod params;
pub mod result;
pub mod runner;
pub mod scheduler;
pub mod stage;
pub mod submitted;
pub mod worker;

pub use barrier::StageBarrier;
pub use context::{StageContext, VoxelSource};
pub use error::{FailureKind, PipelineError};
pub use params::{
    batches, ApplyJobParams, ChunkJobParams, CollectJobParams, CombineJobParams, JobEnvelope, JobOutput, JobParams,
    JobResultFile, StitchJobParams, WorkerEnv,
};
pub use result::{BatchOutcome, StageOutcomes};
pub use runner::{JobRunner, LocalJobRunner, WorkerFn};
pub use scheduler::StageScheduler;
pub use stage::{StageKind, StageReport, StageState};
pub use submitted::{CommandSubmitter, JobSubmitter, ProcessSubmitter, SubmittedJob, SubmittedJobRunner};
