// Mon Oct 19 2026 - Alex

use serde::{Deserialize, Serialize};

/// Axis-aligned box of voxels, `offset` inclusive, `offset + size` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeBox {
    pub offset: [i64; 3],
    pub size: [u32; 3],
}

impl VolumeBox {
    pub fn new(offset: [i64; 3], size: [u32; 3]) -> Self {
        Self { offset, size }
    }

    pub fn end(&self) -> [i64; 3] {
        [
            self.offset[0] + self.size[0] as i64,
            self.offset[1] + self.size[1] as i64,
            self.offset[2] + self.size[2] as i64,
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.size.iter().any(|&s| s == 0)
    }

    pub fn voxel_count(&self) -> u64 {
        self.size.iter().map(|&s| s as u64).product()
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.size[0] as usize, self.size[1] as usize, self.size[2] as usize)
    }

    pub fn contains(&self, p: [i64; 3]) -> bool {
        let end = self.end();
        (0..3).all(|d| p[d] >= self.offset[d] && p[d] < end[d])
    }

    /// Array index of a world coordinate inside this box.
    pub fn index_of(&self, p: [i64; 3]) -> Option<[usize; 3]> {
        if !self.contains(p) {
            return None;
        }
        Some([
            (p[0] - self.offset[0]) as usize,
            (p[1] - self.offset[1]) as usize,
            (p[2] - self.offset[2]) as usize,
        ])
    }

    pub fn grow(&self, margin: [u32; 3]) -> VolumeBox {
        VolumeBox {
            offset: [
                self.offset[0] - margin[0] as i64,
                self.offset[1] - margin[1] as i64,
                self.offset[2] - margin[2] as i64,
            ],
            size: [
                self.size[0] + 2 * margin[0],
                self.size[1] + 2 * margin[1],
                self.size[2] + 2 * margin[2],
            ],
        }
    }

    pub fn intersect(&self, other: &VolumeBox) -> Option<VolumeBox> {
        let a_end = self.end();
        let b_end = other.end();
        let mut offset = [0i64; 3];
        let mut size = [0u32; 3];
        for d in 0..3 {
            let lo = self.offset[d].max(other.offset[d]);
            let hi = a_end[d].min(b_end[d]);
            if hi <= lo {
                return None;
            }
            offset[d] = lo;
            size[d] = (hi - lo) as u32;
        }
        Some(VolumeBox { offset, size })
    }
}

/// One cell of the chunk grid. The core is `[offset, offset + size)`; the
/// regions read and labeled around it are derived from the grid overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chunk {
    pub id: u32,
    pub offset: [i64; 3],
    pub size: [u32; 3],
    pub grid_coord: [u32; 3],
}

impl Chunk {
    pub fn core(&self) -> VolumeBox {
        VolumeBox::new(self.offset, self.size)
    }

    /// Region read from the volume before smoothing.
    pub fn read_region(&self, processing_overlap: [u32; 3]) -> VolumeBox {
        self.core().grow(processing_overlap)
    }

    /// Region covered by the chunk's labeling.
    pub fn labeling_window(&self, stitch_overlap: [u32; 3]) -> VolumeBox {
        self.core().grow(stitch_overlap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_intersection() {
        let a = VolumeBox::new([0, 0, 0], [4, 4, 4]);
        let b = VolumeBox::new([3, 1, -2], [4, 2, 4]);
        let i = a.intersect(&b).unwrap();
        assert_eq!(i.offset, [3, 1, 0]);
        assert_eq!(i.size, [1, 2, 2]);

        let c = VolumeBox::new([4, 0, 0], [4, 4, 4]);
        assert!(a.intersect(&c).is_none());
    }

    #[test]
    fn test_index_of() {
        let b = VolumeBox::new([-1, -1, -1], [6, 6, 6]);
        assert_eq!(b.index_of([-1, 0, 4]), Some([0, 1, 5]));
        assert_eq!(b.index_of([5, 0, 0]), None);
    }

    #[test]
    fn test_chunk_windows() {
        let chunk = Chunk {
            id: 0,
            offset: [8, 0, 0],
            size: [4, 4, 4],
            grid_coord: [2, 0, 0],
        };
        let window = chunk.labeling_window([1, 1, 1]);
        assert_eq!(window.offset, [7, -1, -1]);
        assert_eq!(window.size, [6, 6, 6]);
        assert_eq!(chunk.read_region([3, 3, 3]).size, [10, 10, 10]);
    }
}
