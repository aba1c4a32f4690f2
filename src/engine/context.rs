// Mon Oct 19 2026 - Alex

use crate::aggregation::ObjectStore;
use crate::config::ExtractionConfig;
use crate::engine::error::PipelineError;
use crate::engine::params::WorkerEnv;
use crate::extraction::ExtractionSettings;
use crate::grid::{ChunkGrid, ConfigError};
use crate::merge::{IdAllocation, RemapTable};
use crate::orchestration::checkpoint::Checkpoint;
use crate::volume::{DirLabelStore, LabelStore, RawVolume, VolumeReader};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Input voxels of a channel.
#[derive(Clone)]
pub enum VoxelSource {
    /// Probability (or intensity) maps, labeled from scratch.
    Probabilities(Arc<dyn VolumeReader<f32>>),
    /// An existing id volume; labeling and merging are skipped.
    Ids(Arc<dyn VolumeReader<u64>>),
}

impl VoxelSource {
    pub fn is_ids(&self) -> bool {
        matches!(self, VoxelSource::Ids(_))
    }
}

/// Everything a job of one channel needs. Built once by the coordinator, or
/// by a worker process from its [`WorkerEnv`].
pub struct StageContext {
    pub config: ExtractionConfig,
    pub grid: ChunkGrid,
    pub channel: String,
    pub settings: ExtractionSettings,
    pub source: VoxelSource,
    pub labels: Arc<dyn LabelStore>,
    pub objects: ObjectStore,
    pub checkpoint: Checkpoint,
    allocation: RwLock<Option<Arc<IdAllocation>>>,
    remap: RwLock<Option<Arc<RemapTable>>>,
}

impl StageContext {
    pub fn new(
        config: ExtractionConfig,
        channel: &str,
        source: VoxelSource,
        labels: Arc<dyn LabelStore>,
    ) -> Result<Self, PipelineError> {
        let grid = config.grid()?;
        let settings = match config.channel(channel) {
            Some(c) => ExtractionSettings::for_channel(&config, c),
            None if source.is_ids() => ExtractionSettings {
                processing_overlap: config.resolved_processing_overlap(),
                stitch_overlap: config.stitch_overlap,
                stencil: config.stencil,
                ..ExtractionSettings::default()
            },
            None => {
                return Err(ConfigError::InvalidChannel {
                    channel: channel.to_string(),
                    reason: "not configured".to_string(),
                }
                .into())
            }
        };
        let run_dir = config.run_dir();
        let objects = ObjectStore::new(run_dir.join("objects").join(channel), config.n_buckets)?;
        let checkpoint = Checkpoint::new(run_dir.join(channel))?;

        Ok(Self {
            config,
            grid,
            channel: channel.to_string(),
            settings,
            source,
            labels,
            objects,
            checkpoint,
            allocation: RwLock::new(None),
            remap: RwLock::new(None),
        })
    }

    /// Context whose label arrays live under the run directory.
    pub fn on_disk(config: ExtractionConfig, channel: &str, source: VoxelSource) -> Result<Self, PipelineError> {
        let labels = DirLabelStore::new(config.run_dir().join(channel).join("labels"))?;
        Self::new(config, channel, source, Arc::new(labels))
    }

    pub fn from_env(env: &WorkerEnv) -> Result<Self, PipelineError> {
        let input = env.input.as_ref().ok_or_else(|| {
            ConfigError::InvalidChannel {
                channel: env.channel.clone(),
                reason: "worker has no input volume".to_string(),
            }
        })?;
        let volume = Arc::new(RawVolume::open(input)?);
        let source = if env.from_ids {
            VoxelSource::Ids(volume)
        } else {
            VoxelSource::Probabilities(volume)
        };
        Self::on_disk(env.config.clone(), &env.channel, source)
    }

    pub fn from_ids(&self) -> bool {
        self.source.is_ids()
    }

    /// Chunk order without the excluded chunks.
    pub fn included_chunks(&self) -> Vec<u32> {
        let excluded: BTreeSet<u32> = self.config.excluded_chunks.iter().copied().collect();
        self.grid
            .chunk_order()
            .into_iter()
            .filter(|id| !excluded.contains(id))
            .collect()
    }

    pub fn publish_allocation(&self, allocation: Arc<IdAllocation>) {
        *self.allocation.write() = Some(allocation);
    }

    pub fn publish_remap(&self, remap: Arc<RemapTable>) {
        *self.remap.write() = Some(remap);
    }

    /// Discards everything a previous attempt of this channel left behind:
    /// finished steps, their tables, label arrays and stored objects.
    pub fn reset(&self) -> Result<(), PipelineError> {
        self.checkpoint.reset()?;
        self.labels.clear()?;
        self.objects.clear()?;
        *self.allocation.write() = None;
        *self.remap.write() = None;
        Ok(())
    }

    /// Published id bases; a worker process falls back to the checkpoint.
    pub fn allocation(&self) -> Result<Arc<IdAllocation>, PipelineError> {
        if let Some(allocation) = self.allocation.read().clone() {
            return Ok(allocation);
        }
        let loaded = Arc::new(
            self.checkpoint
                .load_allocation()?
                .ok_or(PipelineError::NotPublished("id allocation"))?,
        );
        self.publish_allocation(loaded.clone());
        Ok(loaded)
    }

    pub fn remap(&self) -> Result<Arc<RemapTable>, PipelineError> {
        if let Some(remap) = self.remap.read().clone() {
            return Ok(remap);
        }
        let loaded = Arc::new(
            self.checkpoint
                .load_remap()?
                .ok_or(PipelineError::NotPublished("remap table"))?,
        );
        self.publish_remap(loaded.clone());
        Ok(loaded)
    }

    /// Describes this context for a worker process.
    pub fn worker_env(&self, input: Option<std::path::PathBuf>) -> WorkerEnv {
        WorkerEnv {
            config: self.config.clone(),
            channel: self.channel.clone(),
            input,
            from_ids: self.from_ids(),
        }
    }
}
