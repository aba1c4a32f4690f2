// Mon Oct 19 2026 - Alex

use crate::aggregation::bucket::{bucket_of, bucket_path};
use crate::aggregation::collector::ChunkVoxels;
use crate::aggregation::combiner::combine;
use crate::aggregation::error::AggregationError;
use crate::aggregation::record::{ObjectRecord, VoxelShard};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

const OBJECTS_FILE: &str = "objects.json";
const SHARD_PREFIX: &str = "shard_";

/// Bucketed on-disk object storage.
///
/// Collect jobs drop one shard file per (chunk, bucket); combining a bucket
/// folds its shards into `objects.json` and then removes them.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
    n_buckets: u32,
}

impl ObjectStore {
    pub fn new<P: AsRef<Path>>(root: P, n_buckets: u32) -> Result<Self, AggregationError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            n_buckets: n_buckets.max(1),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn n_buckets(&self) -> u32 {
        self.n_buckets
    }

    pub fn bucket_dir(&self, bucket: u32) -> PathBuf {
        bucket_path(&self.root, bucket, self.n_buckets)
    }

    fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), AggregationError> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(value)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Writes one shard per touched bucket and returns those buckets.
    /// Rewriting the same chunk replaces its shards.
    pub fn write_chunk(&self, voxels: ChunkVoxels) -> Result<BTreeSet<u32>, AggregationError> {
        let chunk_id = voxels.chunk_id;
        let shards = voxels.into_shards(self.n_buckets);
        for shard in shards.values() {
            self.write_shard(shard)?;
        }
        debug!("chunk {}: wrote {} shards", chunk_id, shards.len());
        Ok(shards.into_keys().collect())
    }

    pub fn write_shard(&self, shard: &VoxelShard) -> Result<(), AggregationError> {
        let dir = self.bucket_dir(shard.bucket);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}{}.json", SHARD_PREFIX, shard.chunk_id));
        Self::write_json_atomic(&path, shard)
    }

    fn shard_files(&self, bucket: u32) -> Result<Vec<PathBuf>, AggregationError> {
        let dir = self.bucket_dir(bucket);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_shard = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(SHARD_PREFIX) && n.ends_with(".json"))
                .unwrap_or(false);
            if is_shard {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn load_bucket(&self, bucket: u32) -> Result<BTreeMap<u64, ObjectRecord>, AggregationError> {
        let path = self.bucket_dir(bucket).join(OBJECTS_FILE);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let records: Vec<ObjectRecord> = serde_json::from_slice(&fs::read(&path)?)?;
        Ok(records.into_iter().map(|r| (r.canonical_id, r)).collect())
    }

    /// Folds the bucket's shards into its object file, then deletes them.
    /// Safe to repeat after a crash at any point.
    pub fn combine_bucket(&self, bucket: u32) -> Result<usize, AggregationError> {
        let files = self.shard_files(bucket)?;
        let existing = self.load_bucket(bucket)?;
        if files.is_empty() {
            return Ok(existing.len());
        }

        let mut shards = Vec::with_capacity(files.len());
        for file in &files {
            let shard: VoxelShard = serde_json::from_slice(&fs::read(file)?)?;
            if shard.bucket != bucket {
                return Err(AggregationError::Bucket {
                    bucket,
                    reason: format!("{} belongs to bucket {}", file.display(), shard.bucket),
                });
            }
            shards.push(shard);
        }

        let records = combine(shards, existing.into_values());
        let list: Vec<&ObjectRecord> = records.values().collect();
        Self::write_json_atomic(&self.bucket_dir(bucket).join(OBJECTS_FILE), &list)?;
        for file in &files {
            fs::remove_file(file)?;
        }
        Ok(records.len())
    }

    /// Removes every shard and object file.
    pub fn clear(&self) -> Result<(), AggregationError> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn get_object(&self, id: u64) -> Result<Option<ObjectRecord>, AggregationError> {
        Ok(self.load_bucket(bucket_of(id, self.n_buckets))?.remove(&id))
    }

    /// Every combined record in the store, in id order.
    pub fn all_objects(&self) -> Result<BTreeMap<u64, ObjectRecord>, AggregationError> {
        let mut out = BTreeMap::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                } else if path.file_name().and_then(|n| n.to_str()) == Some(OBJECTS_FILE) {
                    let records: Vec<ObjectRecord> = serde_json::from_slice(&fs::read(&path)?)?;
                    out.extend(records.into_iter().map(|r| (r.canonical_id, r)));
                }
            }
        }
        Ok(out)
    }
}
