// Mon Oct 19 2026 - Alex

pub mod chunk;
pub mod error;
pub mod layout;

pub use chunk::{Chunk, VolumeBox};
pub use error::ConfigError;
pub use layout::{ChunkGrid, ChunkPair, GridOptions, DEFAULT_STENCIL};
