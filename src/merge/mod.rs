// Mon Oct 19 2026 - Alex

pub mod allocator;
pub mod applier;
pub mod error;
pub mod resolver;
pub mod stitcher;
pub mod union_find;

pub use allocator::{allocate, IdAllocation};
pub use applier::{apply, remap_in_place};
pub use error::MergeError;
pub use resolver::{resolve, RemapTable};
pub use stitcher::{stitch, MergeEdge, OffsetLabels};
pub use union_find::UnionFind;
