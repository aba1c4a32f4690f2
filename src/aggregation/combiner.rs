// Mon Oct 19 2026 - Alex

use crate::aggregation::record::{BoundingBox, ObjectRecord, VoxelRun, VoxelShard};
use std::collections::{BTreeMap, BTreeSet};

/// Sorts runs and merges the ones that overlap or touch on the same line.
fn coalesce(mut runs: Vec<VoxelRun>) -> Vec<VoxelRun> {
    runs.sort_unstable();
    let mut out: Vec<VoxelRun> = Vec::with_capacity(runs.len());
    for run in runs {
        if run.len == 0 {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.x == run.x && last.y == run.y && run.z <= last.z_end() => {
                let end = last.z_end().max(run.z_end());
                last.len = (end - last.z) as u32;
            }
            _ => out.push(run),
        }
    }
    out
}

fn build_record(canonical_id: u64, runs: Vec<VoxelRun>, chunks: BTreeSet<u32>) -> Option<ObjectRecord> {
    let runs = coalesce(runs);
    let mut bbox = BoundingBox::of_run(runs.first()?);
    for run in &runs[1..] {
        bbox.extend(&BoundingBox::of_run(run));
    }
    Some(ObjectRecord {
        canonical_id,
        voxel_count: runs.iter().map(|r| r.len as u64).sum(),
        bbox,
        runs,
        chunks,
    })
}

/// Consolidates shards and previously written records into one record per
/// id. Voxels are merged with set semantics, so the input order and
/// repeated contributions do not change the result.
pub fn combine<S, R>(shards: S, existing: R) -> BTreeMap<u64, ObjectRecord>
where
    S: IntoIterator<Item = VoxelShard>,
    R: IntoIterator<Item = ObjectRecord>,
{
    let mut runs: BTreeMap<u64, Vec<VoxelRun>> = BTreeMap::new();
    let mut chunks: BTreeMap<u64, BTreeSet<u32>> = BTreeMap::new();

    for record in existing {
        runs.entry(record.canonical_id).or_default().extend(record.runs);
        chunks.entry(record.canonical_id).or_default().extend(record.chunks);
    }
    for shard in shards {
        for (id, shard_runs) in shard.objects {
            runs.entry(id).or_default().extend(shard_runs);
            chunks.entry(id).or_default().insert(shard.chunk_id);
        }
    }

    runs.into_iter()
        .filter_map(|(id, object_runs)| {
            let object_chunks = chunks.remove(&id).unwrap_or_default();
            build_record(id, object_runs, object_chunks).map(|r| (id, r))
        })
        .collect()
}
