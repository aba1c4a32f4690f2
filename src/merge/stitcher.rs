// Mon Oct 19 2026 - Alex

use crate::grid::Chunk;
use crate::merge::error::MergeError;
use crate::volume::LocalLabeling;
use itertools::iproduct;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Two global ids seen on the same voxel by neighbouring chunks.
/// Stored with `a > b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MergeEdge {
    pub a: u64,
    pub b: u64,
}

impl MergeEdge {
    /// `None` for background or for an id paired with itself.
    pub fn new(x: u64, y: u64) -> Option<Self> {
        if x == 0 || y == 0 || x == y {
            return None;
        }
        Some(Self {
            a: x.max(y),
            b: x.min(y),
        })
    }
}

/// A chunk's local labels read through its global id offset.
#[derive(Debug, Clone, Copy)]
pub struct OffsetLabels<'a> {
    pub labeling: &'a LocalLabeling,
    pub base: u64,
}

impl<'a> OffsetLabels<'a> {
    pub fn new(labeling: &'a LocalLabeling, base: u64) -> Self {
        Self { labeling, base }
    }

    fn global_at(&self, p: [i64; 3]) -> Result<u64, MergeError> {
        match self.labeling.label_at(p) {
            Some(0) => Ok(0),
            Some(local) => Ok(self.base + local as u64),
            None => Err(MergeError::BandOutsideWindow {
                chunk_id: self.labeling.chunk_id,
                voxel: p,
            }),
        }
    }
}

/// Axis along which two chunks touch, and which of them is lower.
fn shared_face<'c>(a: &'c Chunk, b: &'c Chunk) -> Result<(usize, &'c Chunk), MergeError> {
    let not_adjacent = MergeError::NotAdjacent { a: a.id, b: b.id };
    let mut axis = None;
    for d in 0..3 {
        let (ca, cb) = (a.grid_coord[d] as i64, b.grid_coord[d] as i64);
        match (ca - cb).abs() {
            0 => {}
            1 if axis.is_none() => axis = Some(d),
            _ => return Err(not_adjacent),
        }
    }
    let axis = axis.ok_or(not_adjacent)?;
    let lower = if a.grid_coord[axis] < b.grid_coord[axis] { a } else { b };
    Ok((axis, lower))
}

/// Merge edges between two face-adjacent chunks.
///
/// Only the band `[face - s, face + s)` along the shared axis is compared,
/// restricted to the shared core extent on the other two axes. Both
/// labelings must cover the band.
pub fn stitch(
    chunk_a: &Chunk,
    chunk_b: &Chunk,
    labels_a: OffsetLabels,
    labels_b: OffsetLabels,
    stitch_overlap: [u32; 3],
) -> Result<BTreeSet<MergeEdge>, MergeError> {
    let (axis, lower) = shared_face(chunk_a, chunk_b)?;
    let face = lower.offset[axis] + lower.size[axis] as i64;
    let s = stitch_overlap[axis] as i64;

    let mut lo = lower.offset;
    let mut hi = lower.core().end();
    lo[axis] = face - s;
    hi[axis] = face + s;

    let mut edges = BTreeSet::new();
    for (x, y, z) in iproduct!(lo[0]..hi[0], lo[1]..hi[1], lo[2]..hi[2]) {
        let p = [x, y, z];
        let ga = labels_a.global_at(p)?;
        let gb = labels_b.global_at(p)?;
        if let Some(edge) = MergeEdge::new(ga, gb) {
            edges.insert(edge);
        }
    }
    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{ChunkGrid, VolumeBox};
    use ndarray::Array3;

    fn grid() -> ChunkGrid {
        ChunkGrid::build(VolumeBox::new([0, 0, 0], [8, 4, 4]), [4, 4, 4], [1, 1, 1], [1, 1, 1]).unwrap()
    }

    fn labeling(chunk: &Chunk, voxels: &[([i64; 3], u32)], count: u32) -> LocalLabeling {
        let window = chunk.labeling_window([1, 1, 1]);
        let mut labels = Array3::<u32>::zeros(window.shape());
        for &(p, l) in voxels {
            labels[window.index_of(p).unwrap()] = l;
        }
        LocalLabeling {
            chunk_id: chunk.id,
            window,
            labels,
            local_count: count,
        }
    }

    #[test]
    fn test_edge_normalization() {
        assert_eq!(MergeEdge::new(3, 9), Some(MergeEdge { a: 9, b: 3 }));
        assert_eq!(MergeEdge::new(9, 3), MergeEdge::new(3, 9));
        assert_eq!(MergeEdge::new(0, 4), None);
        assert_eq!(MergeEdge::new(4, 4), None);
    }

    #[test]
    fn test_two_chunk_scenario() {
        let grid = grid();
        let (c0, c1) = (grid.chunk(0).unwrap(), grid.chunk(1).unwrap());
        // An object spanning x = 3..=4 at y = z = 1; each chunk sees both voxels.
        let la = labeling(c0, &[([3, 1, 1], 1), ([4, 1, 1], 1)], 1);
        let lb = labeling(c1, &[([3, 1, 1], 1), ([4, 1, 1], 1)], 1);

        let edges = stitch(c0, c1, OffsetLabels::new(&la, 0), OffsetLabels::new(&lb, 1), [1, 1, 1]).unwrap();
        assert_eq!(edges.into_iter().collect::<Vec<_>>(), vec![MergeEdge { a: 2, b: 1 }]);
    }

    #[test]
    fn test_argument_order_irrelevant() {
        let grid = grid();
        let (c0, c1) = (grid.chunk(0).unwrap(), grid.chunk(1).unwrap());
        let la = labeling(c0, &[([4, 2, 2], 3)], 3);
        let lb = labeling(c1, &[([4, 2, 2], 1)], 1);
        let forward = stitch(c0, c1, OffsetLabels::new(&la, 0), OffsetLabels::new(&lb, 3), [1, 1, 1]).unwrap();
        let backward = stitch(c1, c0, OffsetLabels::new(&lb, 3), OffsetLabels::new(&la, 0), [1, 1, 1]).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 1);
    }

    #[test]
    fn test_outside_band_ignored() {
        let grid = grid();
        let (c0, c1) = (grid.chunk(0).unwrap(), grid.chunk(1).unwrap());
        // Voxel at y = -1 lies in both windows but outside the shared core extent.
        let la = labeling(c0, &[([4, -1, 1], 1)], 1);
        let lb = labeling(c1, &[([4, -1, 1], 1)], 1);
        let edges = stitch(c0, c1, OffsetLabels::new(&la, 0), OffsetLabels::new(&lb, 1), [1, 1, 1]).unwrap();
        assert!(edges.is_empty());
    }

    #[test]
    fn test_non_adjacent_rejected() {
        let grid = ChunkGrid::build(VolumeBox::new([0, 0, 0], [12, 4, 4]), [4, 4, 4], [1, 1, 1], [1, 1, 1]).unwrap();
        let (c0, c2) = (grid.chunk(0).unwrap(), grid.chunk(2).unwrap());
        let la = labeling(c0, &[], 0);
        let lb = labeling(c2, &[], 0);
        assert_eq!(
            stitch(c0, c2, OffsetLabels::new(&la, 0), OffsetLabels::new(&lb, 0), [1, 1, 1]),
            Err(MergeError::NotAdjacent { a: 0, b: 2 })
        );
    }
}
