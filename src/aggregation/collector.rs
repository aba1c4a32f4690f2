// Mon Oct 19 2026 - Alex

use crate::aggregation::bucket::bucket_of;
use crate::aggregation::record::{VoxelRun, VoxelShard};
use crate::grid::{Chunk, VolumeBox};
use crate::volume::GlobalLabeling;
use std::collections::BTreeMap;

/// Runs of every object found in one chunk's core.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkVoxels {
    pub chunk_id: u32,
    pub objects: BTreeMap<u64, Vec<VoxelRun>>,
}

impl ChunkVoxels {
    pub fn voxel_count(&self) -> u64 {
        self.objects.values().flatten().map(|r| r.len as u64).sum()
    }

    /// Splits the chunk's contributions into one shard per bucket.
    pub fn into_shards(self, n_buckets: u32) -> BTreeMap<u32, VoxelShard> {
        let mut shards: BTreeMap<u32, VoxelShard> = BTreeMap::new();
        for (id, runs) in self.objects {
            let bucket = bucket_of(id, n_buckets);
            shards
                .entry(bucket)
                .or_insert_with(|| VoxelShard {
                    chunk_id: self.chunk_id,
                    bucket,
                    objects: BTreeMap::new(),
                })
                .objects
                .insert(id, runs);
        }
        shards
    }
}

/// Groups the voxels a chunk owns (its core, clipped to `volume`) by id.
///
/// The overlap band is skipped so that every voxel is reported by exactly
/// one chunk.
pub fn collect(chunk: &Chunk, labels: &GlobalLabeling, volume: VolumeBox) -> ChunkVoxels {
    let mut out = ChunkVoxels {
        chunk_id: chunk.id,
        objects: BTreeMap::new(),
    };
    let Some(owned) = chunk.core().intersect(&volume) else {
        return out;
    };
    let lo = owned.offset;
    let hi = owned.end();

    for x in lo[0]..hi[0] {
        for y in lo[1]..hi[1] {
            let mut current: Option<(u64, i64)> = None;
            for z in lo[2]..=hi[2] {
                let id = if z < hi[2] {
                    labels.label_at([x, y, z]).unwrap_or(0)
                } else {
                    0
                };
                match current {
                    Some((run_id, _)) if run_id == id => continue,
                    Some((run_id, start)) => {
                        out.objects
                            .entry(run_id)
                            .or_default()
                            .push(VoxelRun::new(x, y, start, (z - start) as u32));
                    }
                    None => {}
                }
                current = (id != 0).then_some((id, z));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn chunk() -> Chunk {
        Chunk {
            id: 1,
            offset: [4, 0, 0],
            size: [4, 4, 4],
            grid_coord: [1, 0, 0],
        }
    }

    fn labeling(voxels: &[([i64; 3], u64)]) -> GlobalLabeling {
        let window = chunk().labeling_window([1, 1, 1]);
        let mut labels = Array3::<u64>::zeros(window.shape());
        for &(p, id) in voxels {
            labels[window.index_of(p).unwrap()] = id;
        }
        GlobalLabeling {
            chunk_id: 1,
            window,
            labels,
        }
    }

    #[test]
    fn test_runs_along_z() {
        let labels = labeling(&[
            ([4, 1, 0], 9),
            ([4, 1, 1], 9),
            ([4, 1, 2], 5),
            ([4, 1, 3], 9),
            ([5, 0, 3], 9),
        ]);
        let voxels = collect(&chunk(), &labels, VolumeBox::new([0, 0, 0], [8, 4, 4]));
        assert_eq!(
            voxels.objects[&9],
            vec![VoxelRun::new(4, 1, 0, 2), VoxelRun::new(4, 1, 3, 1), VoxelRun::new(5, 0, 3, 1)]
        );
        assert_eq!(voxels.objects[&5], vec![VoxelRun::new(4, 1, 2, 1)]);
        assert_eq!(voxels.voxel_count(), 5);
    }

    #[test]
    fn test_overlap_band_not_owned() {
        let labels = labeling(&[([3, 1, 1], 2), ([4, 1, 1], 2), ([8, 1, 1], 2)]);
        let voxels = collect(&chunk(), &labels, VolumeBox::new([0, 0, 0], [9, 4, 4]));
        assert_eq!(voxels.objects[&2], vec![VoxelRun::new(4, 1, 1, 1)]);
    }

    #[test]
    fn test_clipped_to_volume() {
        let labels = labeling(&[([6, 1, 1], 2), ([4, 1, 1], 2)]);
        let voxels = collect(&chunk(), &labels, VolumeBox::new([0, 0, 0], [5, 4, 4]));
        assert_eq!(voxels.voxel_count(), 1);
    }

    #[test]
    fn test_into_shards() {
        let labels = labeling(&[([4, 0, 0], 3), ([4, 0, 2], 13), ([4, 0, 3], 4)]);
        let shards = collect(&chunk(), &labels, VolumeBox::new([0, 0, 0], [8, 4, 4])).into_shards(10);
        assert_eq!(shards.keys().copied().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(shards[&3].objects.len(), 2);
        assert_eq!(shards[&3].chunk_id, 1);
    }
}
