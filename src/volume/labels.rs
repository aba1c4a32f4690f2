// Mon Oct 19 2026 - Alex

use crate::grid::VolumeBox;
use crate::volume::error::VolumeError;
use bytes::{Buf, BufMut, BytesMut};
use ndarray::Array3;

const MAGIC: &[u8; 4] = b"OXLB";
const KIND_LOCAL: u8 = 1;
const KIND_GLOBAL: u8 = 2;
const HEADER_LEN: usize = 4 + 1 + 4 + 3 * 8 + 3 * 4 + 4;

/// Chunk-local labels over the chunk's labeling window.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalLabeling {
    pub chunk_id: u32,
    pub window: VolumeBox,
    pub labels: Array3<u32>,
    pub local_count: u32,
}

impl LocalLabeling {
    pub fn label_at(&self, p: [i64; 3]) -> Option<u32> {
        self.window.index_of(p).map(|idx| self.labels[idx])
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.labels.len() * 4);
        put_header(&mut buf, KIND_LOCAL, self.chunk_id, &self.window, self.local_count);
        for &v in self.labels.iter() {
            buf.put_u32_le(v);
        }
        buf.to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, VolumeError> {
        let mut buf = bytes;
        let (chunk_id, window, local_count) = take_header(&mut buf, KIND_LOCAL)?;
        let n = window.voxel_count() as usize;
        if buf.remaining() != n * 4 {
            return Err(VolumeError::Corrupt(format!(
                "chunk {}: expected {} label bytes, found {}",
                chunk_id,
                n * 4,
                buf.remaining()
            )));
        }
        let mut data = Vec::with_capacity(n);
        for _ in 0..n {
            data.push(buf.get_u32_le());
        }
        Ok(Self {
            chunk_id,
            window,
            labels: Array3::from_shape_vec(window.shape(), data)?,
            local_count,
        })
    }
}

/// Labels in the global (or canonical) id space over a chunk's labeling window.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalLabeling {
    pub chunk_id: u32,
    pub window: VolumeBox,
    pub labels: Array3<u64>,
}

impl GlobalLabeling {
    pub fn label_at(&self, p: [i64; 3]) -> Option<u64> {
        self.window.index_of(p).map(|idx| self.labels[idx])
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.labels.len() * 8);
        put_header(&mut buf, KIND_GLOBAL, self.chunk_id, &self.window, 0);
        for &v in self.labels.iter() {
            buf.put_u64_le(v);
        }
        buf.to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, VolumeError> {
        let mut buf = bytes;
        let (chunk_id, window, _) = take_header(&mut buf, KIND_GLOBAL)?;
        let n = window.voxel_count() as usize;
        if buf.remaining() != n * 8 {
            return Err(VolumeError::Corrupt(format!(
                "chunk {}: expected {} label bytes, found {}",
                chunk_id,
                n * 8,
                buf.remaining()
            )));
        }
        let mut data = Vec::with_capacity(n);
        for _ in 0..n {
            data.push(buf.get_u64_le());
        }
        Ok(Self {
            chunk_id,
            window,
            labels: Array3::from_shape_vec(window.shape(), data)?,
        })
    }
}

fn put_header(buf: &mut BytesMut, kind: u8, chunk_id: u32, window: &VolumeBox, count: u32) {
    buf.put_slice(MAGIC);
    buf.put_u8(kind);
    buf.put_u32_le(chunk_id);
    for d in 0..3 {
        buf.put_i64_le(window.offset[d]);
    }
    for d in 0..3 {
        buf.put_u32_le(window.size[d]);
    }
    buf.put_u32_le(count);
}

fn take_header(buf: &mut &[u8], kind: u8) -> Result<(u32, VolumeBox, u32), VolumeError> {
    if buf.remaining() < HEADER_LEN || &buf[..4] != MAGIC {
        return Err(VolumeError::Corrupt("bad label file header".to_string()));
    }
    buf.advance(4);
    let found = buf.get_u8();
    if found != kind {
        return Err(VolumeError::Corrupt(format!(
            "expected label kind {}, found {}",
            kind, found
        )));
    }
    let chunk_id = buf.get_u32_le();
    let mut offset = [0i64; 3];
    for o in offset.iter_mut() {
        *o = buf.get_i64_le();
    }
    let mut size = [0u32; 3];
    for s in size.iter_mut() {
        *s = buf.get_u32_le();
    }
    let count = buf.get_u32_le();
    Ok((chunk_id, VolumeBox::new(offset, size), count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_encoding() {
        let mut labels = Array3::<u32>::zeros((2, 3, 4));
        labels[[1, 2, 3]] = 5;
        labels[[0, 0, 1]] = 2;
        let labeling = LocalLabeling {
            chunk_id: 9,
            window: VolumeBox::new([-1, 3, 7], [2, 3, 4]),
            labels,
            local_count: 5,
        };
        let decoded = LocalLabeling::decode(&labeling.encode()).unwrap();
        assert_eq!(decoded, labeling);
        assert_eq!(decoded.label_at([0, 5, 10]), Some(5));
        assert_eq!(decoded.label_at([1, 5, 10]), None);
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let labeling = GlobalLabeling {
            chunk_id: 1,
            window: VolumeBox::new([0, 0, 0], [1, 1, 1]),
            labels: Array3::from_elem((1, 1, 1), 1u64 << 40),
        };
        let bytes = labeling.encode();
        assert!(LocalLabeling::decode(&bytes).is_err());
        assert_eq!(GlobalLabeling::decode(&bytes).unwrap(), labeling);
        assert!(GlobalLabeling::decode(&bytes[..bytes.len() - 1]).is_err());
    }
}
