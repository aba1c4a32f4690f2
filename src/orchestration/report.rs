// Mon Oct 19 2026 - Alex

use crate::engine::{PipelineError, StageReport, StageState};
use crate::utils::format_duration;
use colored::*;
use indexmap::IndexMap;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const REPORT_FILE: &str = "report.json";

/// Two final objects that touch often enough along their boundary to be
/// reported as partners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartnerPair {
    pub a: u64,
    pub b: u64,
    pub votes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelReport {
    pub channel: String,
    pub from_ids: bool,
    /// Steps in execution order.
    pub stages: IndexMap<String, StageReport>,
    pub chunks: usize,
    pub excluded_chunks: usize,
    pub max_label: u64,
    pub merged_ids: usize,
    pub edges: usize,
    pub object_count: usize,
    pub partners: Vec<PartnerPair>,
}

impl ChannelReport {
    pub fn new(channel: &str, from_ids: bool) -> Self {
        Self {
            channel: channel.to_string(),
            from_ids,
            stages: IndexMap::new(),
            chunks: 0,
            excluded_chunks: 0,
            max_label: 0,
            merged_ids: 0,
            edges: 0,
            object_count: 0,
            partners: Vec::new(),
        }
    }

    pub fn stage_mut(&mut self, name: &str) -> &mut StageReport {
        self.stages
            .entry(name.to_string())
            .or_insert_with(|| StageReport::new(name))
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.values().map(|s| s.duration).sum()
    }

    pub fn resumed_stages(&self) -> usize {
        self.stages.values().filter(|s| s.state == StageState::Resumed).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub channels: Vec<ChannelReport>,
}

impl RunReport {
    pub fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            channels: Vec::new(),
        }
    }

    pub fn push(&mut self, channel: ChannelReport) {
        self.channels.push(channel);
    }

    pub fn object_count(&self) -> usize {
        self.channels.iter().map(|c| c.object_count).sum()
    }

    pub fn total_duration(&self) -> Duration {
        self.channels.iter().map(|c| c.total_duration()).sum()
    }

    /// Writes `report.json` into the run directory.
    pub fn write(&self, run_dir: &Path) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(run_dir)?;
        let path = run_dir.join(REPORT_FILE);
        fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        Ok(path)
    }

    pub fn load(run_dir: &Path) -> Result<Self, PipelineError> {
        Ok(serde_json::from_slice(&fs::read(run_dir.join(REPORT_FILE))?)?)
    }

    /// Logs the per-stage timing overview.
    pub fn log_overview(&self) {
        info!("{} run '{}'", "Timing overview for".bold(), self.run_id.cyan());
        for channel in &self.channels {
            info!(
                "  {} {}: {} objects, max label {}, {} ids merged over {} edges",
                "channel".dimmed(),
                channel.channel.cyan(),
                channel.object_count.to_string().green(),
                channel.max_label,
                channel.merged_ids,
                channel.edges
            );
            for stage in channel.stages.values() {
                let state = match stage.state {
                    StageState::Completed => "done".green(),
                    StageState::Resumed => "resumed".blue(),
                    StageState::Failed => "failed".red(),
                    StageState::Pending | StageState::Running => "incomplete".yellow(),
                };
                info!(
                    "    {:<10} {:>10} {:>9}  {} batches ({:.0}% ok), {} retries",
                    stage.name,
                    format_duration(stage.duration),
                    state,
                    stage.batches,
                    stage.success_rate() * 100.0,
                    stage.retries
                );
            }
            if !channel.partners.is_empty() {
                info!("    {} partner pairs", channel.partners.len());
            }
        }
        info!(
            "  {} {} objects in {}",
            "total".bold(),
            self.object_count(),
            format_duration(self.total_duration())
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_roundtrip_keeps_stage_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = ChannelReport::new("mito", false);
        for name in ["extract", "allocate", "stitch"] {
            let stage = channel.stage_mut(name);
            stage.start();
            stage.complete();
        }
        channel.stages.insert("collect".to_string(), StageReport::resumed("collect"));
        channel.object_count = 12;
        let mut report = RunReport::new("r1");
        report.push(channel);

        let path = report.write(dir.path()).unwrap();
        assert!(path.ends_with(REPORT_FILE));
        let back = RunReport::load(dir.path()).unwrap();
        let names: Vec<&str> = back.channels[0].stages.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["extract", "allocate", "stitch", "collect"]);
        assert_eq!(back.object_count(), 12);
        assert_eq!(back.channels[0].resumed_stages(), 1);
    }
}
