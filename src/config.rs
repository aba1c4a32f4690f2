// Mon Oct 19 2026 - Alex

use crate::grid::{ChunkGrid, ConfigError, GridOptions, VolumeBox, DEFAULT_STENCIL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoOverlap {
    Auto,
}

/// Processing overlap, either explicit or derived from the smoothing sigmas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverlapSetting {
    Explicit([u32; 3]),
    Auto(AutoOverlap),
}

impl Default for OverlapSetting {
    fn default() -> Self {
        OverlapSetting::Auto(AutoOverlap::Auto)
    }
}

/// How the stored probabilities are scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbabilityScale {
    #[default]
    Unit,
    /// 8-bit maps; thresholds given in `[0, 1]` are scaled by 255.
    Byte,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub threshold: f32,
    #[serde(default)]
    pub sigma: Option<[f32; 3]>,
    #[serde(default)]
    pub scale: ProbabilityScale,
    /// Raw volume directory holding this channel's probabilities.
    #[serde(default)]
    pub input: Option<PathBuf>,
}

impl ChannelConfig {
    pub fn new(name: &str, threshold: f32) -> Self {
        Self {
            name: name.to_string(),
            threshold,
            sigma: None,
            scale: ProbabilityScale::Unit,
            input: None,
        }
    }

    pub fn with_sigma(mut self, sigma: [f32; 3]) -> Self {
        self.sigma = Some(sigma);
        self
    }

    pub fn with_scale(mut self, scale: ProbabilityScale) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_input(mut self, input: PathBuf) -> Self {
        self.input = Some(input);
        self
    }

    pub fn effective_threshold(&self) -> f32 {
        match self.scale {
            ProbabilityScale::Byte if self.threshold <= 1.0 => self.threshold * 255.0,
            _ => self.threshold,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidChannel {
            channel: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if !self.threshold.is_finite() {
            return Err(invalid("threshold must be finite"));
        }
        if let Some(sigma) = self.sigma {
            if sigma.iter().any(|s| !s.is_finite() || *s < 0.0) {
                return Err(invalid("sigma must be finite and non-negative"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub volume: VolumeBox,
    pub chunk_size: [u32; 3],
    pub processing_overlap: OverlapSetting,
    pub stitch_overlap: [u32; 3],
    pub grid_origin: [i64; 3],
    pub stencil: [u32; 3],
    pub channels: Vec<ChannelConfig>,
    pub detect_partners: bool,
    pub n_buckets: u32,
    pub combine_stride: usize,
    /// Chunks (or chunk pairs) handled by one job.
    pub batch_size: usize,
    pub max_threads: usize,
    pub max_retries: u32,
    pub excluded_chunks: Vec<u32>,
    pub work_dir: PathBuf,
    pub run_id: String,
    pub enable_progress_bars: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            volume: VolumeBox::new([0, 0, 0], [0, 0, 0]),
            chunk_size: [256, 256, 256],
            processing_overlap: OverlapSetting::default(),
            stitch_overlap: [1, 1, 1],
            grid_origin: [0, 0, 0],
            stencil: DEFAULT_STENCIL,
            channels: Vec::new(),
            detect_partners: false,
            n_buckets: 100_000,
            combine_stride: 100,
            batch_size: 1,
            max_threads: num_cpus::get(),
            max_retries: 2,
            excluded_chunks: Vec::new(),
            work_dir: PathBuf::from("extraction_work"),
            run_id: "run".to_string(),
            enable_progress_bars: false,
        }
    }
}

impl ExtractionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volume(mut self, volume: VolumeBox) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: [u32; 3]) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_processing_overlap(mut self, overlap: [u32; 3]) -> Self {
        self.processing_overlap = OverlapSetting::Explicit(overlap);
        self
    }

    pub fn with_stitch_overlap(mut self, overlap: [u32; 3]) -> Self {
        self.stitch_overlap = overlap;
        self
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_work_dir(mut self, work_dir: PathBuf) -> Self {
        self.work_dir = work_dir;
        self
    }

    pub fn with_run_id(mut self, run_id: &str) -> Self {
        self.run_id = run_id.to_string();
        self
    }

    pub fn with_n_buckets(mut self, n_buckets: u32) -> Self {
        self.n_buckets = n_buckets;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_detect_partners(mut self, enabled: bool) -> Self {
        self.detect_partners = enabled;
        self
    }

    /// `<work_dir>/runs/<run_id>`; everything a run persists lives below it.
    pub fn run_dir(&self) -> PathBuf {
        self.work_dir.join("runs").join(&self.run_id)
    }

    pub fn with_max_threads(mut self, threads: usize) -> Self {
        self.max_threads = threads;
        self
    }

    pub fn with_excluded_chunks(mut self, chunks: Vec<u32>) -> Self {
        self.excluded_chunks = chunks;
        self
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file_error = |reason: String| ConfigError::Invalid(format!("{}: {}", path.display(), reason));
        let text = fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| file_error(e.to_string()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        fs::write(path.as_ref(), text)
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", path.as_ref().display(), e)))
    }

    /// Smallest overlap that keeps smoothing near the stitch band away from
    /// the read edge: `ceil(4 * max_sigma) + stitch_overlap` per axis.
    pub fn required_processing_overlap(&self) -> [u32; 3] {
        let mut overlap = self.stitch_overlap;
        for d in 0..3 {
            let max_sigma = self
                .channels
                .iter()
                .filter_map(|c| c.sigma)
                .map(|s| s[d])
                .fold(0.0f32, f32::max);
            overlap[d] += (4.0 * max_sigma).ceil() as u32;
        }
        overlap
    }

    pub fn resolved_processing_overlap(&self) -> [u32; 3] {
        match self.processing_overlap {
            OverlapSetting::Explicit(overlap) => overlap,
            OverlapSetting::Auto(_) => self.required_processing_overlap(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::Invalid("at least one channel is required".to_string()));
        }
        let mut names = BTreeSet::new();
        for channel in &self.channels {
            channel.validate()?;
            if !names.insert(channel.name.as_str()) {
                return Err(ConfigError::InvalidChannel {
                    channel: channel.name.clone(),
                    reason: "duplicate channel name".to_string(),
                });
            }
        }
        if self.n_buckets == 0 {
            return Err(ConfigError::Invalid("n_buckets must be greater than 0".to_string()));
        }
        if self.combine_stride == 0 {
            return Err(ConfigError::Invalid("combine_stride must be greater than 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be greater than 0".to_string()));
        }
        if self.max_threads == 0 {
            return Err(ConfigError::Invalid("max_threads must be greater than 0".to_string()));
        }
        if self.run_id.is_empty() || self.run_id.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!("invalid run id '{}'", self.run_id)));
        }
        self.grid()?;

        let given = self.resolved_processing_overlap();
        let required = self.required_processing_overlap();
        if (0..3).any(|d| given[d] < required[d]) {
            return Err(ConfigError::ProcessingOverlapTooSmall { given, required });
        }
        Ok(())
    }

    pub fn grid(&self) -> Result<ChunkGrid, ConfigError> {
        let options = GridOptions {
            grid_origin: self.grid_origin,
            stencil: self.stencil,
        };
        let grid = ChunkGrid::build_with(
            self.volume,
            self.chunk_size,
            self.resolved_processing_overlap(),
            self.stitch_overlap,
            options,
        )?;
        if let Some(&bad) = self
            .excluded_chunks
            .iter()
            .find(|&&id| id as usize >= grid.chunk_count())
        {
            return Err(ConfigError::UnknownChunk(bad));
        }
        Ok(grid)
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.name == name)
    }
}

/// `n` equally spaced byte thresholds strictly between 0 and 255.
pub fn sweep_thresholds(n: usize) -> Vec<f32> {
    (1..=n)
        .map(|k| (255.0 / (n as f32 + 1.0) * k as f32).floor())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ExtractionConfig {
        ExtractionConfig::new()
            .with_volume(VolumeBox::new([0, 0, 0], [64, 64, 32]))
            .with_chunk_size([32, 32, 16])
            .with_channel(ChannelConfig::new("sj", 0.5).with_sigma([1.0, 1.0, 0.5]))
            .with_channel(ChannelConfig::new("vc", 0.3).with_sigma([1.5, 0.2, 0.0]))
    }

    #[test]
    fn test_auto_overlap_uses_max_sigma() {
        let config = config();
        assert_eq!(config.resolved_processing_overlap(), [7, 5, 3]);
    }

    #[test]
    fn test_auto_overlap_without_sigma() {
        let config = ExtractionConfig::new().with_channel(ChannelConfig::new("a", 0.5));
        assert_eq!(config.resolved_processing_overlap(), [1, 1, 1]);
    }

    #[test]
    fn test_byte_scale_threshold() {
        let c = ChannelConfig::new("p", 0.4).with_scale(ProbabilityScale::Byte);
        assert!((c.effective_threshold() - 102.0).abs() < 1e-4);
        let c = ChannelConfig::new("p", 120.0).with_scale(ProbabilityScale::Byte);
        assert_eq!(c.effective_threshold(), 120.0);
        assert_eq!(ChannelConfig::new("p", 0.4).effective_threshold(), 0.4);
    }

    #[test]
    fn test_validate() {
        assert!(config().validate().is_ok());
        assert!(ExtractionConfig::new().validate().is_err());

        let dup = config().with_channel(ChannelConfig::new("sj", 0.1));
        assert!(matches!(dup.validate(), Err(ConfigError::InvalidChannel { .. })));

        let bad_overlap = config()
            .with_processing_overlap([1, 1, 1])
            .with_stitch_overlap([2, 1, 1]);
        assert!(matches!(
            bad_overlap.validate(),
            Err(ConfigError::StitchExceedsProcessing { .. })
        ));

        let narrow = config().with_processing_overlap([7, 4, 3]);
        assert_eq!(
            narrow.validate(),
            Err(ConfigError::ProcessingOverlapTooSmall {
                given: [7, 4, 3],
                required: [7, 5, 3],
            })
        );
        assert!(config().with_processing_overlap([8, 5, 3]).validate().is_ok());

        let excluded = config().with_excluded_chunks(vec![100]);
        assert!(matches!(excluded.validate(), Err(ConfigError::UnknownChunk(100))));
    }

    #[test]
    fn test_overlap_json_forms() {
        let auto: OverlapSetting = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(auto, OverlapSetting::Auto(AutoOverlap::Auto));
        let explicit: OverlapSetting = serde_json::from_str("[3, 3, 1]").unwrap();
        assert_eq!(explicit, OverlapSetting::Explicit([3, 3, 1]));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        config().with_run_id("r7").save(&path).unwrap();
        let loaded = ExtractionConfig::load(&path).unwrap();
        assert_eq!(loaded.run_id, "r7");
        assert_eq!(loaded.channels, config().channels);
    }

    #[test]
    fn test_sweep_thresholds() {
        assert_eq!(sweep_thresholds(4), vec![51.0, 102.0, 153.0, 204.0]);
        assert!(sweep_thresholds(0).is_empty());
    }
}
