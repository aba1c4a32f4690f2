// Mon Oct 19 2026 - Alex

use crate::engine::PipelineError;
use crate::merge::{IdAllocation, MergeEdge, RemapTable};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

const STAGES_FILE: &str = "stages.json";
const TABLE_FILES: [&str; 7] = [
    STAGES_FILE,
    "local_counts.json",
    "partners.json",
    "bases.json",
    "edges.json",
    "remap.json",
    "buckets.json",
];

/// Persisted per-channel run state under `<work_dir>/runs/<run_id>/<channel>`.
///
/// Every table is written once, after the barrier that produced it, so a
/// restarted run can pick up after the last finished step.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    dir: PathBuf,
}

impl Checkpoint {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, PipelineError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<(), PipelineError> {
        let path = self.dir.join(name);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, PipelineError> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&fs::read(&path)?)?))
    }

    pub fn is_done(&self, step: &str) -> bool {
        self.load::<BTreeSet<String>>(STAGES_FILE)
            .ok()
            .flatten()
            .map(|done| done.contains(step))
            .unwrap_or(false)
    }

    pub fn mark_done(&self, step: &str) -> Result<(), PipelineError> {
        let mut done: BTreeSet<String> = self.load(STAGES_FILE)?.unwrap_or_default();
        done.insert(step.to_string());
        self.save(STAGES_FILE, &done)
    }

    /// Forgets finished steps together with the tables they wrote.
    pub fn reset(&self) -> Result<(), PipelineError> {
        for name in TABLE_FILES {
            let path = self.dir.join(name);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    pub fn save_counts(&self, counts: &BTreeMap<u32, u32>) -> Result<(), PipelineError> {
        self.save("local_counts.json", counts)
    }

    pub fn load_counts(&self) -> Result<Option<BTreeMap<u32, u32>>, PipelineError> {
        self.load("local_counts.json")
    }

    pub fn save_partners(&self, partners: &BTreeMap<u32, BTreeMap<u64, u32>>) -> Result<(), PipelineError> {
        self.save("partners.json", partners)
    }

    pub fn load_partners(&self) -> Result<Option<BTreeMap<u32, BTreeMap<u64, u32>>>, PipelineError> {
        self.load("partners.json")
    }

    pub fn save_allocation(&self, allocation: &IdAllocation) -> Result<(), PipelineError> {
        self.save("bases.json", allocation)
    }

    pub fn load_allocation(&self) -> Result<Option<IdAllocation>, PipelineError> {
        self.load("bases.json")
    }

    pub fn save_edges(&self, edges: &BTreeSet<MergeEdge>) -> Result<(), PipelineError> {
        self.save("edges.json", edges)
    }

    pub fn load_edges(&self) -> Result<Option<BTreeSet<MergeEdge>>, PipelineError> {
        self.load("edges.json")
    }

    pub fn save_remap(&self, remap: &RemapTable) -> Result<(), PipelineError> {
        self.save("remap.json", remap)
    }

    pub fn load_remap(&self) -> Result<Option<RemapTable>, PipelineError> {
        self.load("remap.json")
    }

    pub fn save_buckets(&self, buckets: &BTreeSet<u32>) -> Result<(), PipelineError> {
        self.save("buckets.json", buckets)
    }

    pub fn load_buckets(&self) -> Result<Option<BTreeSet<u32>>, PipelineError> {
        self.load("buckets.json")
    }
}
