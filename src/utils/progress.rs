// Mon Oct 19 2026 - Alex

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {prefix:>8.bold} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

/// Per-stage progress bar. A hidden bar swallows every update, so callers
/// never need to check whether progress output is enabled.
pub struct StageProgress {
    bar: ProgressBar,
}

impl StageProgress {
    pub fn new(stage: &str, total: u64, enabled: bool) -> Self {
        if !enabled {
            return Self::hidden();
        }
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar().template(TEMPLATE) {
            bar.set_style(style.progress_chars("█▓▒░ "));
        }
        bar.set_prefix(stage.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_progress_counts() {
        let progress = StageProgress::new("extract", 10, false);
        progress.inc(3);
        progress.inc(2);
        assert_eq!(progress.position(), 5);
        progress.finish("done");
    }
}
