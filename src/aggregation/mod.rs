// Mon Oct 19 2026 - Alex

pub mod bucket;
pub mod collector;
pub mod combiner;
pub mod error;
pub mod record;
pub mod store;

pub use bucket::{bucket_of, bucket_path};
pub use collector::{collect, ChunkVoxels};
pub use combiner::combine;
pub use error::AggregationError;
pub use record::{BoundingBox, ObjectRecord, VoxelRun, VoxelShard};
pub use store::ObjectStore;
