// Mon Oct 19 2026 - Alex

use crate::grid::VolumeBox;
use crate::volume::error::VolumeError;
use crate::volume::reader::{VolumeReader, VolumeWriter, Voxel};
use memmap2::{Mmap, MmapMut};
use ndarray::Array3;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const META_FILE: &str = "meta.json";
const DATA_FILE: &str = "data.raw";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    U8,
    F32,
    U64,
}

impl Dtype {
    pub fn size(&self) -> usize {
        match self {
            Dtype::U8 => 1,
            Dtype::F32 => 4,
            Dtype::U64 => 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawMeta {
    extent: VolumeBox,
    dtype: Dtype,
}

enum Mapping {
    ReadOnly(Mmap),
    Writable(RwLock<MmapMut>),
}

/// A memory-mapped volume stored as a directory holding `meta.json` and a
/// little-endian C-ordered (x slowest, z fastest) `data.raw`.
pub struct RawVolume {
    path: PathBuf,
    meta: RawMeta,
    mapping: Mapping,
}

impl RawVolume {
    pub fn create<P: AsRef<Path>>(dir: P, extent: VolumeBox, dtype: Dtype) -> Result<Self, VolumeError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let meta = RawMeta { extent, dtype };
        fs::write(dir.join(META_FILE), serde_json::to_vec_pretty(&meta)?)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(dir.join(DATA_FILE))?;
        file.set_len(extent.voxel_count() * dtype.size() as u64)?;

        let mmap = unsafe { MmapMut::map_mut(&file) }?;
        log::debug!("Created raw volume at {} ({:?}, {:?})", dir.display(), extent, dtype);

        Ok(Self {
            path: dir.to_path_buf(),
            meta,
            mapping: Mapping::Writable(RwLock::new(mmap)),
        })
    }

    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, VolumeError> {
        let dir = dir.as_ref();
        let meta: RawMeta = serde_json::from_slice(&fs::read(dir.join(META_FILE))?)?;
        let file = File::open(dir.join(DATA_FILE))?;
        let mmap = unsafe { Mmap::map(&file) }?;

        let expected = meta.extent.voxel_count() as usize * meta.dtype.size();
        if mmap.len() != expected {
            return Err(VolumeError::ReadFailed(format!(
                "{}: expected {} bytes, found {}",
                dir.display(),
                expected,
                mmap.len()
            )));
        }

        Ok(Self {
            path: dir.to_path_buf(),
            meta,
            mapping: Mapping::ReadOnly(mmap),
        })
    }

    pub fn open_writable<P: AsRef<Path>>(dir: P) -> Result<Self, VolumeError> {
        let dir = dir.as_ref();
        let meta: RawMeta = serde_json::from_slice(&fs::read(dir.join(META_FILE))?)?;
        let file = OpenOptions::new().read(true).write(true).open(dir.join(DATA_FILE))?;
        let mmap = unsafe { MmapMut::map_mut(&file) }?;

        let expected = meta.extent.voxel_count() as usize * meta.dtype.size();
        if mmap.len() != expected {
            return Err(VolumeError::ReadFailed(format!(
                "{}: expected {} bytes, found {}",
                dir.display(),
                expected,
                mmap.len()
            )));
        }

        Ok(Self {
            path: dir.to_path_buf(),
            meta,
            mapping: Mapping::Writable(RwLock::new(mmap)),
        })
    }

    /// Reopens an existing volume of the same extent and dtype for writing,
    /// or creates a zeroed one. The flag is true when the volume was created.
    pub fn open_or_create<P: AsRef<Path>>(
        dir: P,
        extent: VolumeBox,
        dtype: Dtype,
    ) -> Result<(Self, bool), VolumeError> {
        let dir = dir.as_ref();
        if dir.join(META_FILE).exists() {
            match Self::open_writable(dir) {
                Ok(volume) if volume.extent() == extent && volume.dtype() == dtype => return Ok((volume, false)),
                Ok(volume) => log::warn!(
                    "Replacing {} ({:?}, {:?})",
                    dir.display(),
                    volume.extent(),
                    volume.dtype()
                ),
                Err(e) => log::warn!("Replacing unreadable volume {}: {}", dir.display(), e),
            }
        }
        Ok((Self::create(dir, extent, dtype)?, true))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extent(&self) -> VolumeBox {
        self.meta.extent
    }

    pub fn dtype(&self) -> Dtype {
        self.meta.dtype
    }

    pub fn flush(&self) -> Result<(), VolumeError> {
        if let Mapping::Writable(mmap) = &self.mapping {
            mmap.read().flush()?;
        }
        Ok(())
    }

    fn byte_offset(&self, p: [i64; 3]) -> usize {
        let e = &self.meta.extent;
        let x = (p[0] - e.offset[0]) as usize;
        let y = (p[1] - e.offset[1]) as usize;
        let z = (p[2] - e.offset[2]) as usize;
        ((x * e.size[1] as usize + y) * e.size[2] as usize + z) * self.meta.dtype.size()
    }

    fn read_into<T: Voxel>(&self, bytes: &[u8], region: VolumeBox) -> Array3<T> {
        let mut out = Array3::<T>::default(region.shape());
        let Some(shared) = region.intersect(&self.meta.extent) else {
            return out;
        };
        let dtype = self.meta.dtype;
        let width = dtype.size();
        let end = shared.end();

        for x in shared.offset[0]..end[0] {
            for y in shared.offset[1]..end[1] {
                let row = self.byte_offset([x, y, shared.offset[2]]);
                for (k, z) in (shared.offset[2]..end[2]).enumerate() {
                    let at = row + k * width;
                    let idx = [
                        (x - region.offset[0]) as usize,
                        (y - region.offset[1]) as usize,
                        (z - region.offset[2]) as usize,
                    ];
                    out[idx] = T::decode(dtype, &bytes[at..at + width]);
                }
            }
        }
        out
    }
}

impl<T: Voxel> VolumeReader<T> for RawVolume {
    fn extent(&self) -> VolumeBox {
        self.meta.extent
    }

    fn read(&self, region: VolumeBox) -> Result<Array3<T>, VolumeError> {
        match &self.mapping {
            Mapping::ReadOnly(mmap) => Ok(self.read_into(mmap, region)),
            Mapping::Writable(mmap) => Ok(self.read_into(&mmap.read(), region)),
        }
    }
}

impl<T: Voxel> VolumeWriter<T> for RawVolume {
    fn write(&self, offset: [i64; 3], data: &Array3<T>) -> Result<(), VolumeError> {
        let (sx, sy, sz) = data.dim();
        let region = VolumeBox::new(offset, [sx as u32, sy as u32, sz as u32]);
        let Mapping::Writable(mmap) = &self.mapping else {
            return Err(VolumeError::ReadFailed(format!(
                "{} is opened read-only",
                self.path.display()
            )));
        };
        let Some(shared) = region.intersect(&self.meta.extent) else {
            return Ok(());
        };

        let dtype = self.meta.dtype;
        let width = dtype.size();
        let end = shared.end();
        let mut bytes = mmap.write();

        for x in shared.offset[0]..end[0] {
            for y in shared.offset[1]..end[1] {
                let row = self.byte_offset([x, y, shared.offset[2]]);
                for (k, z) in (shared.offset[2]..end[2]).enumerate() {
                    let at = row + k * width;
                    let value = data[[
                        (x - offset[0]) as usize,
                        (y - offset[1]) as usize,
                        (z - offset[2]) as usize,
                    ]];
                    value.encode(dtype, &mut bytes[at..at + width]);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_write_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let extent = VolumeBox::new([10, 0, 0], [3, 4, 5]);
        let volume = RawVolume::create(dir.path(), extent, Dtype::F32).unwrap();

        let mut patch = Array3::<f32>::zeros((1, 2, 2));
        patch.fill(0.5);
        VolumeWriter::write(&volume, [11, 1, 1], &patch).unwrap();
        volume.flush().unwrap();
        drop(volume);

        let volume = RawVolume::open(dir.path()).unwrap();
        let out: Array3<f32> = volume.read(VolumeBox::new([10, 0, 0], [3, 4, 5])).unwrap();
        assert_eq!(out[[1, 1, 1]], 0.5);
        assert_eq!(out[[1, 2, 2]], 0.5);
        assert_eq!(out[[0, 1, 1]], 0.0);
        assert_eq!(out.iter().filter(|&&v| v > 0.0).count(), 4);
    }

    #[test]
    fn test_open_or_create_keeps_matching_data() {
        let dir = tempfile::tempdir().unwrap();
        let extent = VolumeBox::new([0, 0, 0], [2, 2, 2]);
        let (volume, created) = RawVolume::open_or_create(dir.path(), extent, Dtype::U64).unwrap();
        assert!(created);
        VolumeWriter::write(&volume, [1, 1, 1], &Array3::from_elem((1, 1, 1), 9u64)).unwrap();
        volume.flush().unwrap();
        drop(volume);

        let (volume, created) = RawVolume::open_or_create(dir.path(), extent, Dtype::U64).unwrap();
        assert!(!created);
        let out: Array3<u64> = volume.read(extent).unwrap();
        assert_eq!(out[[1, 1, 1]], 9);
        drop(volume);

        let bigger = VolumeBox::new([0, 0, 0], [3, 2, 2]);
        let (volume, created) = RawVolume::open_or_create(dir.path(), bigger, Dtype::U64).unwrap();
        assert!(created);
        assert_eq!(volume.extent(), bigger);
    }

    #[test]
    fn test_read_partially_outside() {
        let dir = tempfile::tempdir().unwrap();
        let extent = VolumeBox::new([0, 0, 0], [2, 2, 2]);
        let volume = RawVolume::create(dir.path(), extent, Dtype::U64).unwrap();
        VolumeWriter::write(&volume, [0, 0, 0], &Array3::from_elem((2, 2, 2), 3u64)).unwrap();

        let out: Array3<u64> = volume.read(VolumeBox::new([1, 1, 1], [2, 2, 2])).unwrap();
        assert_eq!(out[[0, 0, 0]], 3);
        assert_eq!(out[[1, 1, 1]], 0);
    }

    #[test]
    fn test_open_rejects_truncated_data() {
        let dir = tempfile::tempdir().unwrap();
        let extent = VolumeBox::new([0, 0, 0], [2, 2, 2]);
        drop(RawVolume::create(dir.path(), extent, Dtype::U8).unwrap());
        fs::write(dir.path().join(DATA_FILE), [0u8; 3]).unwrap();
        assert!(matches!(RawVolume::open(dir.path()), Err(VolumeError::ReadFailed(_))));
    }
}
