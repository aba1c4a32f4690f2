// Mon Oct 19 2026 - Alex

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// `len` consecutive voxels starting at `(x, y, z)` along z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VoxelRun {
    pub x: i64,
    pub y: i64,
    pub z: i64,
    pub len: u32,
}

impl VoxelRun {
    pub fn new(x: i64, y: i64, z: i64, len: u32) -> Self {
        Self { x, y, z, len }
    }

    /// One past the last z of the run.
    pub fn z_end(&self) -> i64 {
        self.z + self.len as i64
    }

    pub fn voxels(&self) -> impl Iterator<Item = [i64; 3]> + '_ {
        (self.z..self.z_end()).map(move |z| [self.x, self.y, z])
    }
}

/// Inclusive lower and exclusive upper corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [i64; 3],
    pub max: [i64; 3],
}

impl BoundingBox {
    pub fn of_run(run: &VoxelRun) -> Self {
        Self {
            min: [run.x, run.y, run.z],
            max: [run.x + 1, run.y + 1, run.z_end()],
        }
    }

    pub fn extend(&mut self, other: &BoundingBox) {
        for d in 0..3 {
            self.min[d] = self.min[d].min(other.min[d]);
            self.max[d] = self.max[d].max(other.max[d]);
        }
    }

    pub fn size(&self) -> [u64; 3] {
        [
            (self.max[0] - self.min[0]) as u64,
            (self.max[1] - self.min[1]) as u64,
            (self.max[2] - self.min[2]) as u64,
        ]
    }
}

/// Runs contributed by one chunk to the objects of one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelShard {
    pub chunk_id: u32,
    pub bucket: u32,
    pub objects: BTreeMap<u64, Vec<VoxelRun>>,
}

/// All voxels of one canonical object, consolidated across chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub canonical_id: u64,
    pub voxel_count: u64,
    pub bbox: BoundingBox,
    /// Sorted by `(x, y, z)` and non-overlapping.
    pub runs: Vec<VoxelRun>,
    pub chunks: BTreeSet<u32>,
}

impl ObjectRecord {
    pub fn contains(&self, p: [i64; 3]) -> bool {
        let key = VoxelRun::new(p[0], p[1], p[2], u32::MAX);
        let idx = self.runs.partition_point(|r| (r.x, r.y, r.z) <= (key.x, key.y, key.z));
        idx > 0 && {
            let run = &self.runs[idx - 1];
            run.x == p[0] && run.y == p[1] && p[2] < run.z_end()
        }
    }
}
