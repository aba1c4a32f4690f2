// Mon Oct 19 2026 - Alex

use crate::volume::error::VolumeError;
use crate::volume::labels::{GlobalLabeling, LocalLabeling};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-chunk label arrays handed from one stage to the next.
pub trait LabelStore: Send + Sync {
    fn put_local(&self, labeling: &LocalLabeling) -> Result<(), VolumeError>;
    fn get_local(&self, chunk_id: u32) -> Result<LocalLabeling, VolumeError>;
    fn put_final(&self, labeling: &GlobalLabeling) -> Result<(), VolumeError>;
    fn get_final(&self, chunk_id: u32) -> Result<GlobalLabeling, VolumeError>;
    /// Drops every stored array.
    fn clear(&self) -> Result<(), VolumeError>;
}

#[derive(Default)]
pub struct MemoryLabelStore {
    local: RwLock<AHashMap<u32, LocalLabeling>>,
    finals: RwLock<AHashMap<u32, GlobalLabeling>>,
}

impl MemoryLabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_count(&self) -> usize {
        self.local.read().len()
    }
}

impl LabelStore for MemoryLabelStore {
    fn put_local(&self, labeling: &LocalLabeling) -> Result<(), VolumeError> {
        self.local.write().insert(labeling.chunk_id, labeling.clone());
        Ok(())
    }

    fn get_local(&self, chunk_id: u32) -> Result<LocalLabeling, VolumeError> {
        self.local
            .read()
            .get(&chunk_id)
            .cloned()
            .ok_or(VolumeError::MissingChunk(chunk_id))
    }

    fn put_final(&self, labeling: &GlobalLabeling) -> Result<(), VolumeError> {
        self.finals.write().insert(labeling.chunk_id, labeling.clone());
        Ok(())
    }

    fn get_final(&self, chunk_id: u32) -> Result<GlobalLabeling, VolumeError> {
        self.finals
            .read()
            .get(&chunk_id)
            .cloned()
            .ok_or(VolumeError::MissingChunk(chunk_id))
    }

    fn clear(&self) -> Result<(), VolumeError> {
        self.local.write().clear();
        self.finals.write().clear();
        Ok(())
    }
}

/// Stores label arrays as one file per chunk under `local/` and `final/`.
/// Files are written to a temporary name and renamed, so a retried job
/// never leaves a half-written array behind.
#[derive(Debug, Clone)]
pub struct DirLabelStore {
    root: PathBuf,
}

impl DirLabelStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, VolumeError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("local"))?;
        fs::create_dir_all(root.join("final"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn local_path(&self, chunk_id: u32) -> PathBuf {
        self.root.join("local").join(format!("chunk_{}.lbl", chunk_id))
    }

    fn final_path(&self, chunk_id: u32) -> PathBuf {
        self.root.join("final").join(format!("chunk_{}.lbl", chunk_id))
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), VolumeError> {
        let tmp = path.with_extension("lbl.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read(path: &Path, chunk_id: u32) -> Result<Vec<u8>, VolumeError> {
        match fs::read(path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(VolumeError::MissingChunk(chunk_id)),
            Err(e) => Err(VolumeError::Io(e)),
        }
    }
}

impl LabelStore for DirLabelStore {
    fn put_local(&self, labeling: &LocalLabeling) -> Result<(), VolumeError> {
        Self::write_atomic(&self.local_path(labeling.chunk_id), &labeling.encode())
    }

    fn get_local(&self, chunk_id: u32) -> Result<LocalLabeling, VolumeError> {
        LocalLabeling::decode(&Self::read(&self.local_path(chunk_id), chunk_id)?)
    }

    fn put_final(&self, labeling: &GlobalLabeling) -> Result<(), VolumeError> {
        Self::write_atomic(&self.final_path(labeling.chunk_id), &labeling.encode())
    }

    fn get_final(&self, chunk_id: u32) -> Result<GlobalLabeling, VolumeError> {
        GlobalLabeling::decode(&Self::read(&self.final_path(chunk_id), chunk_id)?)
    }

    fn clear(&self) -> Result<(), VolumeError> {
        for sub in ["local", "final"] {
            let dir = self.root.join(sub);
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::VolumeBox;
    use ndarray::Array3;

    fn labeling(chunk_id: u32) -> LocalLabeling {
        LocalLabeling {
            chunk_id,
            window: VolumeBox::new([0, 0, 0], [2, 2, 2]),
            labels: Array3::from_elem((2, 2, 2), 1),
            local_count: 1,
        }
    }

    #[test]
    fn test_dir_store_roundtrip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirLabelStore::new(dir.path()).unwrap();

        assert!(matches!(store.get_local(3), Err(VolumeError::MissingChunk(3))));

        store.put_local(&labeling(3)).unwrap();
        assert_eq!(store.get_local(3).unwrap(), labeling(3));

        store.put_local(&labeling(3)).unwrap();
        assert_eq!(store.get_local(3).unwrap().local_count, 1);

        store.clear().unwrap();
        assert!(matches!(store.get_local(3), Err(VolumeError::MissingChunk(3))));
        store.put_local(&labeling(4)).unwrap();
        assert_eq!(store.get_local(4).unwrap().chunk_id, 4);
    }

    #[test]
    fn test_memory_store_final() {
        let store = MemoryLabelStore::new();
        let labeling = GlobalLabeling {
            chunk_id: 2,
            window: VolumeBox::new([0, 0, 0], [1, 1, 1]),
            labels: Array3::from_elem((1, 1, 1), 42),
        };
        store.put_final(&labeling).unwrap();
        assert_eq!(store.get_final(2).unwrap(), labeling);
        assert!(store.get_final(1).is_err());
    }
}
