// Mon Oct 19 2026 - Alex

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Parallel stages that run as batches of jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Extract,
    Stitch,
    Apply,
    Collect,
    Combine,
}

impl StageKind {
    pub const ALL: [StageKind; 5] = [
        StageKind::Extract,
        StageKind::Stitch,
        StageKind::Apply,
        StageKind::Collect,
        StageKind::Combine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Extract => "extract",
            StageKind::Stitch => "stitch",
            StageKind::Apply => "apply",
            StageKind::Collect => "collect",
            StageKind::Combine => "combine",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("unknown stage '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Pending,
    Running,
    Completed,
    /// Loaded from a previous run's checkpoint.
    Resumed,
    Failed,
}

/// Timing and outcome of one step of a run, as shown in the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub name: String,
    pub state: StageState,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub batches: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub retries: u32,
    #[serde(skip)]
    started: Option<Instant>,
}

impl StageReport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: StageState::Pending,
            duration: Duration::ZERO,
            batches: 0,
            succeeded: 0,
            failed: 0,
            retries: 0,
            started: None,
        }
    }

    pub fn resumed(name: &str) -> Self {
        let mut report = Self::new(name);
        report.state = StageState::Resumed;
        report
    }

    pub fn start(&mut self) {
        self.state = StageState::Running;
        self.started = Some(Instant::now());
    }

    pub fn complete(&mut self) {
        self.finish(StageState::Completed);
    }

    pub fn fail(&mut self) {
        self.finish(StageState::Failed);
    }

    fn finish(&mut self, state: StageState) {
        self.state = state;
        if let Some(start) = self.started.take() {
            self.duration = start.elapsed();
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.state, StageState::Completed | StageState::Resumed)
    }

    pub fn success_rate(&self) -> f64 {
        if self.batches == 0 {
            1.0
        } else {
            self.succeeded as f64 / self.batches as f64
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
