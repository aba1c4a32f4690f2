// Mon Oct 19 2026 - Alex

pub mod aggregation;
pub mod config;
pub mod engine;
pub mod extraction;
pub mod grid;
pub mod merge;
pub mod orchestration;
pub mod utils;
pub mod volume;

pub use config::{ChannelConfig, ExtractionConfig};
pub use engine::{JobRunner, LocalJobRunner, PipelineError, StageContext, VoxelSource};
pub use grid::{Chunk, ChunkGrid, ConfigError, VolumeBox};
pub use orchestration::{Coordinator, RunReport};
