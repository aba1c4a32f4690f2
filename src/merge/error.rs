// Mon Oct 19 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("no local count for chunks {0:?}")]
    MissingCounts(Vec<u32>),
    #[error("chunks {a} and {b} are not face-adjacent")]
    NotAdjacent { a: u32, b: u32 },
    #[error("labeling of chunk {chunk_id} does not cover voxel {voxel:?} of the stitch band")]
    BandOutsideWindow { chunk_id: u32, voxel: [i64; 3] },
    #[error("global id space overflows at chunk {0}")]
    Overflow(u32),
}
