// Mon Oct 19 2026 - Alex

use crate::config::{sweep_thresholds, ExtractionConfig, ProbabilityScale};
use crate::grid::ConfigError;
use crate::orchestration::report::RunReport;
use log::info;

/// One config per sweep threshold. Every run gets its own run id
/// (`<run_id>_t<threshold>`) so the runs never share state.
pub fn sweep_configs(config: &ExtractionConfig, n: usize) -> Result<Vec<ExtractionConfig>, ConfigError> {
    if n == 0 {
        return Err(ConfigError::Invalid("a sweep needs at least one threshold".to_string()));
    }
    Ok(sweep_thresholds(n)
        .into_iter()
        .map(|threshold| {
            let mut run = config.clone().with_run_id(&format!("{}_t{}", config.run_id, threshold));
            for channel in &mut run.channels {
                channel.threshold = threshold;
                // Sweep thresholds are byte values already.
                channel.scale = ProbabilityScale::Unit;
            }
            run
        })
        .collect())
}

/// Runs the whole pipeline once per sweep threshold.
pub fn run_sweep<F, E>(config: &ExtractionConfig, n: usize, mut run: F) -> Result<Vec<RunReport>, E>
where
    F: FnMut(&ExtractionConfig) -> Result<RunReport, E>,
    E: From<ConfigError>,
{
    let configs = sweep_configs(config, n)?;
    let mut reports = Vec::with_capacity(configs.len());
    for (i, config) in configs.iter().enumerate() {
        info!("Sweep {}/{}: run '{}'", i + 1, configs.len(), config.run_id);
        reports.push(run(config)?);
    }
    Ok(reports)
}
