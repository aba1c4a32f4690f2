// Mon Oct 19 2026 - Alex

use crate::config::ExtractionConfig;
use crate::engine::error::FailureKind;
use crate::engine::stage::StageKind;
use crate::extraction::ExtractionSettings;
use crate::grid::ChunkPair;
use crate::merge::MergeEdge;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkJobParams {
    pub chunk_ids: Vec<u32>,
    pub settings: ExtractionSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchJobParams {
    pub pairs: Vec<ChunkPair>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyJobParams {
    pub chunk_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectJobParams {
    pub chunk_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombineJobParams {
    pub buckets: Vec<u32>,
}

/// Self-contained description of one batch; this is what gets written to
/// `storage/job_<i>.json` for submitted jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "params", rename_all = "lowercase")]
pub enum JobParams {
    Extract(ChunkJobParams),
    Stitch(StitchJobParams),
    Apply(ApplyJobParams),
    Collect(CollectJobParams),
    Combine(CombineJobParams),
}

impl JobParams {
    pub fn stage(&self) -> StageKind {
        match self {
            JobParams::Extract(_) => StageKind::Extract,
            JobParams::Stitch(_) => StageKind::Stitch,
            JobParams::Apply(_) => StageKind::Apply,
            JobParams::Collect(_) => StageKind::Collect,
            JobParams::Combine(_) => StageKind::Combine,
        }
    }

    /// Number of items (chunks, pairs or buckets) in the batch.
    pub fn item_count(&self) -> usize {
        match self {
            JobParams::Extract(p) => p.chunk_ids.len(),
            JobParams::Stitch(p) => p.pairs.len(),
            JobParams::Apply(p) => p.chunk_ids.len(),
            JobParams::Collect(p) => p.chunk_ids.len(),
            JobParams::Combine(p) => p.buckets.len(),
        }
    }
}

/// What a batch reports back. Keys are the items the batch finished, so a
/// stage barrier can tell exactly which items are still outstanding.
///
/// Adjacently tagged: an internally tagged enum is buffered before decoding
/// and the buffer cannot read JSON string keys back as integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "output", rename_all = "lowercase")]
pub enum JobOutput {
    Extract {
        local_counts: BTreeMap<u32, u32>,
        /// Partner votes per chunk, keyed by packed local label pairs.
        partners: BTreeMap<u32, BTreeMap<u64, u32>>,
    },
    Stitch {
        pairs: Vec<ChunkPair>,
        edges: BTreeSet<MergeEdge>,
    },
    Apply {
        chunk_ids: Vec<u32>,
    },
    Collect {
        chunk_ids: Vec<u32>,
        buckets: BTreeSet<u32>,
        voxels: u64,
    },
    Combine {
        objects: BTreeMap<u32, usize>,
    },
}

/// Where a worker process finds its inputs; enough to rebuild the stage
/// context without the coordinator's memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerEnv {
    pub config: ExtractionConfig,
    pub channel: String,
    /// Raw volume read by extraction, or the id volume in from-ids mode.
    pub input: Option<PathBuf>,
    pub from_ids: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub batch_id: usize,
    pub env: WorkerEnv,
    pub params: JobParams,
}

/// Contents of `out/job_<i>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobResultFile {
    Ok(JobOutput),
    Err { kind: FailureKind, message: String },
}

/// Splits items into batches of at most `size`.
pub fn batches<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(|c| c.to_vec()).collect()
}
