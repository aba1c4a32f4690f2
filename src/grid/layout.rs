// Mon Oct 19 2026 - Alex

use crate::grid::chunk::{Chunk, VolumeBox};
use crate::grid::error::ConfigError;
use itertools::iproduct;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_STENCIL: [u32; 3] = [7, 7, 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridOptions {
    /// Chunk boundaries sit at `grid_origin + k * chunk_size`.
    pub grid_origin: [i64; 3],
    /// Window used by boundary partner detection.
    pub stencil: [u32; 3],
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            grid_origin: [0, 0, 0],
            stencil: DEFAULT_STENCIL,
        }
    }
}

/// Two face-adjacent chunks; `lower` precedes `upper` along `axis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPair {
    pub lower: u32,
    pub upper: u32,
    pub axis: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkGrid {
    chunks: Vec<Chunk>,
    dims: [u32; 3],
    chunk_size: [u32; 3],
    processing_overlap: [u32; 3],
    stitch_overlap: [u32; 3],
    grid_box: VolumeBox,
    volume: VolumeBox,
    options: GridOptions,
}

impl ChunkGrid {
    pub fn build(
        volume: VolumeBox,
        chunk_size: [u32; 3],
        processing_overlap: [u32; 3],
        stitch_overlap: [u32; 3],
    ) -> Result<Self, ConfigError> {
        Self::build_with(
            volume,
            chunk_size,
            processing_overlap,
            stitch_overlap,
            GridOptions::default(),
        )
    }

    pub fn build_with(
        volume: VolumeBox,
        chunk_size: [u32; 3],
        processing_overlap: [u32; 3],
        stitch_overlap: [u32; 3],
        options: GridOptions,
    ) -> Result<Self, ConfigError> {
        Self::validate(volume, chunk_size, processing_overlap, stitch_overlap, &options)?;

        let grid_box = Self::snap_to_grid(volume, chunk_size, options.grid_origin);
        let dims = [
            grid_box.size[0] / chunk_size[0],
            grid_box.size[1] / chunk_size[1],
            grid_box.size[2] / chunk_size[2],
        ];

        let chunks = iproduct!(0..dims[0], 0..dims[1], 0..dims[2])
            .enumerate()
            .map(|(id, (gx, gy, gz))| {
                let grid_coord = [gx, gy, gz];
                let mut offset = [0i64; 3];
                for d in 0..3 {
                    offset[d] = grid_box.offset[d] + grid_coord[d] as i64 * chunk_size[d] as i64;
                }
                Chunk {
                    id: id as u32,
                    offset,
                    size: chunk_size,
                    grid_coord,
                }
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Chunk grid {:?} x {:?} covering {:?} (requested {:?})",
            dims,
            chunk_size,
            grid_box,
            volume
        );

        Ok(Self {
            chunks,
            dims,
            chunk_size,
            processing_overlap,
            stitch_overlap,
            grid_box,
            volume,
            options,
        })
    }

    fn validate(
        volume: VolumeBox,
        chunk_size: [u32; 3],
        processing_overlap: [u32; 3],
        stitch_overlap: [u32; 3],
        options: &GridOptions,
    ) -> Result<(), ConfigError> {
        if volume.is_empty() {
            return Err(ConfigError::EmptyVolume(volume.size));
        }
        if chunk_size.iter().any(|&c| c == 0) {
            return Err(ConfigError::ZeroChunkSize(chunk_size));
        }
        if options.stencil.iter().any(|&s| s % 2 == 0) {
            return Err(ConfigError::EvenStencil(options.stencil));
        }
        if stitch_overlap.iter().any(|&s| s == 0) {
            return Err(ConfigError::ZeroStitchOverlap(stitch_overlap));
        }
        if (0..3).any(|d| stitch_overlap[d] > processing_overlap[d]) {
            return Err(ConfigError::StitchExceedsProcessing {
                stitch: stitch_overlap,
                processing: processing_overlap,
            });
        }
        Ok(())
    }

    /// Snaps the start down to the grid and pads the size up to a chunk multiple.
    fn snap_to_grid(volume: VolumeBox, chunk_size: [u32; 3], origin: [i64; 3]) -> VolumeBox {
        let end = volume.end();
        let mut offset = [0i64; 3];
        let mut size = [0u32; 3];
        for d in 0..3 {
            let cs = chunk_size[d] as i64;
            let start = origin[d] + (volume.offset[d] - origin[d]).div_euclid(cs) * cs;
            let span = end[d] - start;
            let padded = (span + cs - 1) / cs * cs;
            offset[d] = start;
            size[d] = padded as u32;
        }
        VolumeBox { offset, size }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk(&self, id: u32) -> Result<&Chunk, ConfigError> {
        self.chunks
            .get(id as usize)
            .ok_or(ConfigError::UnknownChunk(id))
    }

    /// Chunk ids in processing order.
    pub fn chunk_order(&self) -> Vec<u32> {
        self.chunks.iter().map(|c| c.id).collect()
    }

    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    pub fn chunk_size(&self) -> [u32; 3] {
        self.chunk_size
    }

    pub fn processing_overlap(&self) -> [u32; 3] {
        self.processing_overlap
    }

    pub fn stitch_overlap(&self) -> [u32; 3] {
        self.stitch_overlap
    }

    pub fn grid_box(&self) -> VolumeBox {
        self.grid_box
    }

    pub fn volume(&self) -> VolumeBox {
        self.volume
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    pub fn chunk_at(&self, grid_coord: [u32; 3]) -> Option<&Chunk> {
        if (0..3).any(|d| grid_coord[d] >= self.dims[d]) {
            return None;
        }
        let index = (grid_coord[0] * self.dims[1] + grid_coord[1]) * self.dims[2] + grid_coord[2];
        self.chunks.get(index as usize)
    }

    /// Face-adjacent chunks, at most two per axis.
    pub fn neighbors(&self, chunk_id: u32) -> Result<BTreeSet<u32>, ConfigError> {
        let chunk = self.chunk(chunk_id)?;
        let mut result = BTreeSet::new();

        for axis in 0..3 {
            let mut coord = chunk.grid_coord;
            if coord[axis] > 0 {
                coord[axis] -= 1;
                if let Some(n) = self.chunk_at(coord) {
                    result.insert(n.id);
                }
            }
            let mut coord = chunk.grid_coord;
            coord[axis] += 1;
            if let Some(n) = self.chunk_at(coord) {
                result.insert(n.id);
            }
        }

        Ok(result)
    }

    /// Every face-adjacent pair exactly once.
    pub fn adjacent_pairs(&self) -> Vec<ChunkPair> {
        let mut pairs = Vec::new();
        for chunk in &self.chunks {
            for axis in 0..3 {
                let mut coord = chunk.grid_coord;
                coord[axis] += 1;
                if let Some(upper) = self.chunk_at(coord) {
                    pairs.push(ChunkPair {
                        lower: chunk.id,
                        upper: upper.id,
                        axis,
                    });
                }
            }
        }
        pairs
    }

    /// The chunk whose core contains `voxel`.
    pub fn owner_of(&self, voxel: [i64; 3]) -> Option<u32> {
        if !self.grid_box.contains(voxel) {
            return None;
        }
        let mut coord = [0u32; 3];
        for d in 0..3 {
            coord[d] = ((voxel[d] - self.grid_box.offset[d]) / self.chunk_size[d] as i64) as u32;
        }
        self.chunk_at(coord).map(|c| c.id)
    }
}
