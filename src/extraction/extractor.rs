// Mon Oct 19 2026 - Alex

use crate::config::{ChannelConfig, ExtractionConfig};
use crate::extraction::gaussian::gaussian_smooth;
use crate::extraction::labeling::label_components;
use crate::extraction::partners::partner_votes;
use crate::extraction::threshold::threshold_mask;
use crate::grid::{Chunk, ConfigError, DEFAULT_STENCIL};
use crate::volume::{LocalLabeling, VolumeError, VolumeReader};
use log::debug;
use ndarray::s;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything a worker needs to label one chunk of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSettings {
    pub processing_overlap: [u32; 3],
    pub stitch_overlap: [u32; 3],
    /// Already scaled; foreground is `value > threshold`.
    pub threshold: f32,
    pub sigma: Option<[f32; 3]>,
    pub stencil: [u32; 3],
    pub detect_partners: bool,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            processing_overlap: [1, 1, 1],
            stitch_overlap: [1, 1, 1],
            threshold: 0.5,
            sigma: None,
            stencil: DEFAULT_STENCIL,
            detect_partners: false,
        }
    }
}

impl ExtractionSettings {
    pub fn for_channel(config: &ExtractionConfig, channel: &ChannelConfig) -> Self {
        Self {
            processing_overlap: config.resolved_processing_overlap(),
            stitch_overlap: config.stitch_overlap,
            threshold: channel.effective_threshold(),
            sigma: channel.sigma,
            stencil: config.stencil,
            detect_partners: config.detect_partners,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

/// Result of labeling one chunk. `partners` holds vote counts keyed by
/// packed chunk-local label pairs and is empty unless partner detection is on.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkExtraction {
    pub labeling: LocalLabeling,
    pub partners: BTreeMap<u64, u32>,
}

pub struct LocalExtractor {
    settings: ExtractionSettings,
}

impl LocalExtractor {
    pub fn new(settings: ExtractionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExtractionSettings {
        &self.settings
    }

    /// Labels the chunk's window. Reading the same chunk twice yields the
    /// same labeling.
    pub fn extract(&self, chunk: &Chunk, reader: &dyn VolumeReader<f32>) -> Result<LocalLabeling, VolumeError> {
        let po = self.settings.processing_overlap;
        let so = self.settings.stitch_overlap;
        if (0..3).any(|d| so[d] > po[d]) {
            return Err(ConfigError::StitchExceedsProcessing {
                stitch: so,
                processing: po,
            }
            .into());
        }
        let region = chunk.read_region(po);
        let window = chunk.labeling_window(so);

        let mut data = reader.read(region)?;
        if let Some(sigma) = self.settings.sigma {
            data = gaussian_smooth(&data, sigma);
        }

        let lo = [
            (po[0] - so[0]) as usize,
            (po[1] - so[1]) as usize,
            (po[2] - so[2]) as usize,
        ];
        let (wx, wy, wz) = window.shape();
        let cropped = data.slice(s![lo[0]..lo[0] + wx, lo[1]..lo[1] + wy, lo[2]..lo[2] + wz]);
        let mask = threshold_mask(cropped, self.settings.threshold);
        let (labels, local_count) = label_components(&mask);

        debug!("chunk {}: {} local objects", chunk.id, local_count);
        Ok(LocalLabeling {
            chunk_id: chunk.id,
            window,
            labels,
            local_count,
        })
    }

    pub fn extract_with_partners(
        &self,
        chunk: &Chunk,
        reader: &dyn VolumeReader<f32>,
    ) -> Result<ChunkExtraction, VolumeError> {
        let labeling = self.extract(chunk, reader)?;
        let partners = if self.settings.detect_partners {
            partner_votes(&labeling.labels, self.settings.stencil)?
        } else {
            BTreeMap::new()
        };
        Ok(ChunkExtraction { labeling, partners })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{ChunkGrid, VolumeBox};
    use crate::volume::MemoryVolume;
    use ndarray::Array3;

    fn two_chunk_volume() -> (ChunkGrid, MemoryVolume<f32>) {
        let volume = VolumeBox::new([0, 0, 0], [8, 4, 4]);
        let grid = ChunkGrid::build(volume, [4, 4, 4], [1, 1, 1], [1, 1, 1]).unwrap();
        let mut data = Array3::<f32>::zeros((8, 4, 4));
        // One bar crossing the face at x = 4.
        for x in 2..6 {
            data[[x, 1, 1]] = 1.0;
        }
        data[[0, 3, 3]] = 1.0;
        (grid, MemoryVolume::from_array([0, 0, 0], data))
    }

    #[test]
    fn test_labeling_covers_window() {
        let (grid, volume) = two_chunk_volume();
        let extractor = LocalExtractor::new(ExtractionSettings::default());
        let chunk = grid.chunk(0).unwrap();
        let labeling = extractor.extract(chunk, &volume).unwrap();

        assert_eq!(labeling.window, VolumeBox::new([-1, -1, -1], [6, 6, 6]));
        assert_eq!(labeling.local_count, 2);
        // The corner voxel is scanned first.
        assert_eq!(labeling.label_at([0, 3, 3]), Some(1));
        assert_eq!(labeling.label_at([4, 1, 1]), Some(2));
        assert_eq!(labeling.label_at([-1, 0, 0]), Some(0));
    }

    #[test]
    fn test_threshold_is_strict() {
        let (grid, volume) = two_chunk_volume();
        let settings = ExtractionSettings::default().with_threshold(1.0);
        let labeling = LocalExtractor::new(settings)
            .extract(grid.chunk(1).unwrap(), &volume)
            .unwrap();
        assert_eq!(labeling.local_count, 0);
    }

    #[test]
    fn test_extract_is_idempotent() {
        let (grid, volume) = two_chunk_volume();
        let extractor = LocalExtractor::new(ExtractionSettings::default());
        let chunk = grid.chunk(1).unwrap();
        assert_eq!(
            extractor.extract(chunk, &volume).unwrap(),
            extractor.extract(chunk, &volume).unwrap()
        );
    }

    #[test]
    fn test_smoothing_uses_read_margin() {
        let volume = VolumeBox::new([0, 0, 0], [4, 4, 4]);
        let grid = ChunkGrid::build(volume, [4, 4, 4], [5, 5, 5], [1, 1, 1]).unwrap();
        let reader = MemoryVolume::from_array([0, 0, 0], Array3::<f32>::from_elem((4, 4, 4), 1.0));
        let settings = ExtractionSettings {
            processing_overlap: [5, 5, 5],
            sigma: Some([1.0, 1.0, 1.0]),
            threshold: 0.5,
            ..ExtractionSettings::default()
        };
        let labeling = LocalExtractor::new(settings).extract(grid.chunk(0).unwrap(), &reader).unwrap();
        // Blurring against the zero margin pulls the corner below threshold
        // while the center stays foreground.
        assert_eq!(labeling.labels.dim(), (6, 6, 6));
        assert_eq!(labeling.label_at([0, 0, 0]), Some(0));
        assert!(labeling.label_at([2, 2, 2]).unwrap() > 0);
    }

    #[test]
    fn test_partner_votes_reported() {
        let mut data = Array3::<f32>::zeros((9, 9, 5));
        data.slice_mut(s![0..4, .., ..]).fill(1.0);
        data.slice_mut(s![5..9, .., ..]).fill(1.0);
        let reader = MemoryVolume::from_array([0, 0, 0], data);
        let grid = ChunkGrid::build(VolumeBox::new([0, 0, 0], [9, 9, 5]), [9, 9, 5], [1, 1, 1], [1, 1, 1]).unwrap();
        let settings = ExtractionSettings {
            detect_partners: true,
            ..ExtractionSettings::default()
        };
        let out = LocalExtractor::new(settings)
            .extract_with_partners(grid.chunk(0).unwrap(), &reader)
            .unwrap();
        assert_eq!(out.labeling.local_count, 2);
        assert_eq!(out.partners.len(), 1);
        assert!(out.partners.contains_key(&crate::extraction::partner_key(1, 2)));
    }
}
