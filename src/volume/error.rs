// Mon Oct 19 2026 - Alex

use crate::grid::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VolumeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Region {offset:?}+{size:?} lies outside the volume")]
    OutOfBounds { offset: [i64; 3], size: [u32; 3] },
    #[error("Corrupt label file: {0}")]
    Corrupt(String),
    #[error("No labels stored for chunk {0}")]
    MissingChunk(u32),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Read failed: {0}")]
    ReadFailed(String),
}
