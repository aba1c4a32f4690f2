// Mon Oct 19 2026 - Alex

use crate::aggregation::AggregationError;
use crate::engine::stage::StageKind;
use crate::grid::ConfigError;
use crate::merge::MergeError;
use crate::volume::VolumeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error class a worker process reports back with its failure, so the
/// submitting side can rebuild an error of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Config,
    Merge,
    NotPublished,
    Barrier,
    Transient,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        self == FailureKind::Transient
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{stage} failed for chunk {chunk_id}: {reason}")]
    ChunkProcessing {
        chunk_id: u32,
        stage: StageKind,
        reason: String,
    },

    #[error("aggregation failed for bucket {bucket}: {reason}")]
    Aggregation { bucket: u32, reason: String },

    #[error("{stage}: no result for batches {missing:?} ({detail})")]
    Scheduling {
        stage: StageKind,
        missing: Vec<usize>,
        detail: String,
    },

    #[error("{stage} barrier incomplete, missing {missing:?}")]
    BarrierIncomplete { stage: StageKind, missing: Vec<u64> },

    #[error("{stage} worker for batch {batch_id} failed ({kind:?}): {message}")]
    Worker {
        stage: StageKind,
        batch_id: usize,
        kind: FailureKind,
        message: String,
    },

    #[error("{0} has not been published for this run")]
    NotPublished(&'static str),

    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("volume error: {0}")]
    Volume(#[from] VolumeError),

    #[error("object store error: {0}")]
    Store(#[from] AggregationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn chunk(chunk_id: u32, stage: StageKind, reason: impl ToString) -> Self {
        PipelineError::ChunkProcessing {
            chunk_id,
            stage,
            reason: reason.to_string(),
        }
    }

    pub fn bucket(bucket: u32, reason: impl ToString) -> Self {
        PipelineError::Aggregation {
            bucket,
            reason: reason.to_string(),
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PipelineError::Config(_) => FailureKind::Config,
            PipelineError::Merge(_) => FailureKind::Merge,
            PipelineError::NotPublished(_) => FailureKind::NotPublished,
            PipelineError::BarrierIncomplete { .. } => FailureKind::Barrier,
            PipelineError::Worker { kind, .. } => *kind,
            _ => FailureKind::Transient,
        }
    }

    /// Configuration and merge-graph errors repeat on every attempt.
    pub fn is_retryable(&self) -> bool {
        self.failure_kind().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classes() {
        assert!(PipelineError::chunk(3, StageKind::Extract, "read failed").is_retryable());
        assert!(PipelineError::bucket(7, "disk full").is_retryable());
        assert!(!PipelineError::Config(ConfigError::ZeroChunkSize([0, 1, 1])).is_retryable());
        assert!(!PipelineError::Merge(MergeError::MissingCounts(vec![1])).is_retryable());
        assert_eq!(PipelineError::NotPublished("bases").failure_kind(), FailureKind::NotPublished);
    }

    #[test]
    fn test_worker_error_keeps_kind() {
        let err = PipelineError::Worker {
            stage: StageKind::Stitch,
            batch_id: 2,
            kind: FailureKind::Merge,
            message: "cycle".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.failure_kind(), FailureKind::Merge);
        assert!(err.to_string().starts_with("stitch worker for batch 2 failed (Merge)"));
    }

    #[test]
    fn test_messages_name_the_failure() {
        let err = PipelineError::BarrierIncomplete {
            stage: StageKind::Extract,
            missing: vec![2, 5],
        };
        assert_eq!(err.to_string(), "extract barrier incomplete, missing [2, 5]");
        let err = PipelineError::chunk(4, StageKind::Apply, "no labels");
        assert_eq!(err.to_string(), "apply failed for chunk 4: no labels");
    }
}
