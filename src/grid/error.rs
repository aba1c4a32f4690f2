// Mon Oct 19 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunk size must be positive on every axis, got {0:?}")]
    ZeroChunkSize([u32; 3]),
    #[error("stencil window must be odd on every axis, got {0:?}")]
    EvenStencil([u32; 3]),
    #[error("stitch overlap {stitch:?} exceeds processing overlap {processing:?}")]
    StitchExceedsProcessing {
        stitch: [u32; 3],
        processing: [u32; 3],
    },
    #[error("processing overlap {given:?} is below the required {required:?}")]
    ProcessingOverlapTooSmall { given: [u32; 3], required: [u32; 3] },
    #[error("stitch overlap must be at least 1 on every axis, got {0:?}")]
    ZeroStitchOverlap([u32; 3]),
    #[error("volume is empty: size {0:?}")]
    EmptyVolume([u32; 3]),
    #[error("unknown chunk id {0}")]
    UnknownChunk(u32),
    #[error("invalid channel '{channel}': {reason}")]
    InvalidChannel { channel: String, reason: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
