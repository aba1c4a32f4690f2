// Mon Oct 19 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bucket {bucket}: {reason}")]
    Bucket { bucket: u32, reason: String },
}
