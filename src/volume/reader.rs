// Mon Oct 19 2026 - Alex

use crate::grid::VolumeBox;
use crate::volume::error::VolumeError;
use crate::volume::raw::Dtype;
use ndarray::{s, Array3, ArrayView3};
use parking_lot::RwLock;

/// Scalar types that can be stored in a voxel volume.
pub trait Voxel: Copy + Default + PartialEq + Send + Sync + 'static {
    fn decode(dtype: Dtype, bytes: &[u8]) -> Self;
    fn encode(self, dtype: Dtype, out: &mut [u8]);
}

impl Voxel for f32 {
    fn decode(dtype: Dtype, bytes: &[u8]) -> Self {
        match dtype {
            Dtype::U8 => bytes[0] as f32,
            Dtype::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Dtype::U64 => u64::decode(dtype, bytes) as f32,
        }
    }

    fn encode(self, dtype: Dtype, out: &mut [u8]) {
        match dtype {
            Dtype::U8 => out[0] = self.clamp(0.0, 255.0) as u8,
            Dtype::F32 => out.copy_from_slice(&self.to_le_bytes()),
            Dtype::U64 => out.copy_from_slice(&(self.max(0.0) as u64).to_le_bytes()),
        }
    }
}

impl Voxel for u64 {
    fn decode(dtype: Dtype, bytes: &[u8]) -> Self {
        match dtype {
            Dtype::U8 => bytes[0] as u64,
            Dtype::F32 => f32::decode(dtype, bytes).max(0.0) as u64,
            Dtype::U64 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes[..8]);
                u64::from_le_bytes(buf)
            }
        }
    }

    fn encode(self, dtype: Dtype, out: &mut [u8]) {
        match dtype {
            Dtype::U8 => out[0] = self.min(255) as u8,
            Dtype::F32 => out.copy_from_slice(&(self as f32).to_le_bytes()),
            Dtype::U64 => out.copy_from_slice(&self.to_le_bytes()),
        }
    }
}

/// Read access to a volume. Voxels outside `extent()` read as background.
pub trait VolumeReader<T>: Send + Sync {
    fn extent(&self) -> VolumeBox;
    fn read(&self, region: VolumeBox) -> Result<Array3<T>, VolumeError>;
}

pub trait VolumeWriter<T>: Send + Sync {
    /// Writes `data` with its first voxel at `offset`; parts outside the
    /// volume are dropped.
    fn write(&self, offset: [i64; 3], data: &Array3<T>) -> Result<(), VolumeError>;
}

/// Copies the intersection of two boxes from `src` into `dst`.
pub(crate) fn copy_region<T: Clone>(
    src: ArrayView3<T>,
    src_box: VolumeBox,
    dst: &mut Array3<T>,
    dst_box: VolumeBox,
) {
    let Some(shared) = src_box.intersect(&dst_box) else {
        return;
    };
    let end = shared.end();
    let so = |d: usize| (shared.offset[d] - src_box.offset[d]) as usize;
    let se = |d: usize| (end[d] - src_box.offset[d]) as usize;
    let doff = |d: usize| (shared.offset[d] - dst_box.offset[d]) as usize;
    let dend = |d: usize| (end[d] - dst_box.offset[d]) as usize;

    dst.slice_mut(s![doff(0)..dend(0), doff(1)..dend(1), doff(2)..dend(2)])
        .assign(&src.slice(s![so(0)..se(0), so(1)..se(1), so(2)..se(2)]));
}

/// Volume held entirely in memory; used for tests and small inputs.
pub struct MemoryVolume<T> {
    extent: VolumeBox,
    data: RwLock<Array3<T>>,
}

impl<T: Clone + Default> MemoryVolume<T> {
    pub fn new(extent: VolumeBox) -> Self {
        Self {
            extent,
            data: RwLock::new(Array3::default(extent.shape())),
        }
    }

    pub fn from_array(offset: [i64; 3], data: Array3<T>) -> Self {
        let (x, y, z) = data.dim();
        Self {
            extent: VolumeBox::new(offset, [x as u32, y as u32, z as u32]),
            data: RwLock::new(data),
        }
    }

    pub fn get(&self, p: [i64; 3]) -> Option<T> {
        let idx = self.extent.index_of(p)?;
        Some(self.data.read()[idx].clone())
    }

    pub fn set(&self, p: [i64; 3], value: T) {
        if let Some(idx) = self.extent.index_of(p) {
            self.data.write()[idx] = value;
        }
    }

    pub fn snapshot(&self) -> Array3<T> {
        self.data.read().clone()
    }
}

impl<T: Clone + Default + Send + Sync> VolumeReader<T> for MemoryVolume<T> {
    fn extent(&self) -> VolumeBox {
        self.extent
    }

    fn read(&self, region: VolumeBox) -> Result<Array3<T>, VolumeError> {
        let mut out = Array3::default(region.shape());
        let data = self.data.read();
        copy_region(data.view(), self.extent, &mut out, region);
        Ok(out)
    }
}

impl<T: Clone + Default + Send + Sync> VolumeWriter<T> for MemoryVolume<T> {
    fn write(&self, offset: [i64; 3], data: &Array3<T>) -> Result<(), VolumeError> {
        let (x, y, z) = data.dim();
        let src_box = VolumeBox::new(offset, [x as u32, y as u32, z as u32]);
        let mut target = self.data.write();
        copy_region(data.view(), src_box, &mut target, self.extent);
        Ok(())
    }
}
