// Mon Oct 19 2026 - Alex

pub mod error;
pub mod labels;
pub mod raw;
pub mod reader;
pub mod store;

pub use error::VolumeError;
pub use labels::{GlobalLabeling, LocalLabeling};
pub use raw::{Dtype, RawVolume};
pub use reader::{MemoryVolume, VolumeReader, VolumeWriter, Voxel};
pub use store::{DirLabelStore, LabelStore, MemoryLabelStore};
