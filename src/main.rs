// Mon Oct 19 2026 - Alex

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use object_extractor::{
    config::{ChannelConfig, ExtractionConfig},
    engine::{
        worker, CommandSubmitter, JobRunner, LocalJobRunner, ProcessSubmitter, StageContext, StageKind,
        SubmittedJobRunner, VoxelSource,
    },
    orchestration::{run_sweep, Coordinator, RunReport},
    utils::{format_duration, logging},
    volume::{Dtype, RawVolume},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author = "Alex")]
#[command(version = "1.0.0")]
#[command(about = "Chunked connected-component extraction for large 3-D volumes", long_about = None)]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, global = true)]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Label every configured channel and build its object records.
    Run(RunOptions),
    /// Build object records straight from an existing id volume.
    FromIds {
        #[command(flatten)]
        options: RunOptions,
        /// Raw u64 id volume directory.
        #[arg(long)]
        ids: PathBuf,
        #[arg(long, default_value = "ids")]
        channel: String,
    },
    /// Run the pipeline once per equally spaced byte threshold.
    Sweep {
        #[command(flatten)]
        options: RunOptions,
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },
    /// Print the chunk layout without running anything.
    Plan {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Execute one serialized batch; started by the submitting runners.
    Worker {
        #[arg(long)]
        stage: StageKind,
        #[arg(long)]
        params: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum RunnerKind {
    Local,
    Process,
    Command,
}

#[derive(Args, Debug)]
struct RunOptions {
    #[arg(short, long)]
    config: PathBuf,

    #[arg(long)]
    work_dir: Option<PathBuf>,

    #[arg(long)]
    run_id: Option<String>,

    #[arg(short, long)]
    threads: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    max_retries: Option<u32>,

    /// Chunk ids left out of the run, comma separated.
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<u32>,

    #[arg(long)]
    detect_partners: bool,

    #[arg(long, value_enum, default_value_t = RunnerKind::Local)]
    runner: RunnerKind,

    /// Submit command for the command runner; see `CommandSubmitter`.
    #[arg(long)]
    submit_cmd: Option<String>,

    /// Queue listing command for the command runner.
    #[arg(long)]
    status_cmd: Option<String>,

    #[arg(long, default_value_t = 2)]
    poll_secs: u64,

    /// Write the final labels of each channel as a raw u64 volume here.
    #[arg(long)]
    export: Option<PathBuf>,

    /// Ignore checkpoints of an earlier attempt with the same run id.
    #[arg(long)]
    restart: bool,
}

impl RunOptions {
    fn load_config(&self) -> Result<ExtractionConfig> {
        let mut config = ExtractionConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        if let Some(run_id) = &self.run_id {
            config.run_id = run_id.clone();
        }
        if let Some(threads) = self.threads {
            config.max_threads = threads;
        }
        if let Some(size) = self.batch_size {
            config.batch_size = size;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if !self.exclude.is_empty() {
            config.excluded_chunks = self.exclude.clone();
        }
        config.detect_partners |= self.detect_partners;
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "[!]".red(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let level = logging::level_from_verbosity(cli.verbose);
    match &cli.command {
        Command::Worker {
            log_file: Some(path), ..
        } => logging::init_logger_with_file(level, path)?,
        _ if std::env::var_os("RUST_LOG").is_some() => logging::init_from_env(),
        _ => logging::init_logger(level),
    }
    let progress = !cli.no_progress;
    let start = Instant::now();

    match &cli.command {
        Command::Run(options) => {
            let config = options.load_config()?;
            let report = run_pipeline(&config, options, None, progress)?;
            print_summary(&report);
        }
        Command::FromIds {
            options,
            ids,
            channel,
        } => {
            let mut config = options.load_config()?;
            if config.channel(channel).is_none() {
                config = config.with_channel(ChannelConfig::new(channel, 0.0));
            }
            config.channels.retain(|c| &c.name == channel);
            let report = run_pipeline(&config, options, Some(ids), progress)?;
            print_summary(&report);
        }
        Command::Sweep { options, count } => {
            let config = options.load_config()?;
            let reports = run_sweep(&config, *count, |run_config| {
                run_pipeline(run_config, options, None, progress)
                    .with_context(|| format!("sweep run '{}'", run_config.run_id))
            })?;
            for report in &reports {
                print_summary(report);
            }
        }
        Command::Plan { config } => {
            let config = ExtractionConfig::load(config)?;
            print_plan(&config)?;
        }
        Command::Worker {
            stage, params, out, ..
        } => {
            log::debug!("Worker for stage {}", stage);
            worker::run_job_file(params, out)?;
            return Ok(());
        }
    }

    println!(
        "{} Finished in {}",
        "[+]".green(),
        format_duration(start.elapsed())
    );
    Ok(())
}

fn run_pipeline(
    config: &ExtractionConfig,
    options: &RunOptions,
    ids: Option<&PathBuf>,
    progress: bool,
) -> Result<RunReport> {
    config.validate()?;
    println!(
        "{} Run '{}' in {}",
        "[*]".blue(),
        config.run_id,
        config.run_dir().display()
    );

    let mut report = RunReport::new(&config.run_id);
    for channel in &config.channels {
        let input = match ids {
            Some(path) => path.clone(),
            None => channel
                .input
                .clone()
                .with_context(|| format!("channel '{}' has no input volume", channel.name))?,
        };
        let volume = Arc::new(
            RawVolume::open(&input).with_context(|| format!("opening {}", input.display()))?,
        );
        let source = if ids.is_some() {
            VoxelSource::Ids(volume)
        } else {
            VoxelSource::Probabilities(volume)
        };

        let ctx = StageContext::on_disk(config.clone(), &channel.name, source)?;
        if options.restart {
            ctx.reset()?;
        }
        let runner = make_runner(options, &ctx, input)?;
        let mut coordinator = Coordinator::new(runner).with_progress(progress);

        let export = match (&options.export, ids) {
            (Some(dir), None) => Some(RawVolume::open_or_create(
                dir.join(&channel.name),
                config.volume,
                Dtype::U64,
            )?),
            _ => None,
        };
        let export = match export {
            Some((writer, created)) => {
                let writer = Arc::new(writer);
                coordinator = if created {
                    coordinator.with_new_export(writer.clone())
                } else {
                    coordinator.with_export(writer.clone())
                };
                Some(writer)
            }
            None => None,
        };

        println!("{} Channel '{}'", "[*]".blue(), channel.name.cyan());
        report.push(coordinator.run_channel(&ctx)?);
        if let Some(writer) = export {
            writer.flush()?;
            println!("{} Exported labels to {}", "[+]".green(), writer.path().display());
        }
    }

    let path = report.write(&config.run_dir())?;
    report.log_overview();
    println!("{} Report written to {}", "[+]".green(), path.display());
    Ok(report)
}

fn make_runner(options: &RunOptions, ctx: &StageContext, input: PathBuf) -> Result<Arc<dyn JobRunner>> {
    let jobs_root = ctx.checkpoint.dir().join("jobs");
    let poll = Duration::from_secs(options.poll_secs.max(1));
    let runner: Arc<dyn JobRunner> = match options.runner {
        RunnerKind::Local => Arc::new(LocalJobRunner::new(ctx.config.max_threads)?),
        RunnerKind::Process => Arc::new(
            SubmittedJobRunner::new(
                jobs_root,
                ctx.worker_env(Some(input)),
                Box::new(ProcessSubmitter::current_exe()?),
            )
            .with_poll_interval(poll),
        ),
        RunnerKind::Command => {
            let (Some(submit), Some(status)) = (&options.submit_cmd, &options.status_cmd) else {
                bail!("the command runner needs --submit-cmd and --status-cmd");
            };
            let submitter = CommandSubmitter::new(submit, status, std::env::current_exe()?);
            Arc::new(
                SubmittedJobRunner::new(jobs_root, ctx.worker_env(Some(input)), Box::new(submitter))
                    .with_poll_interval(poll),
            )
        }
    };
    Ok(runner)
}

fn print_plan(config: &ExtractionConfig) -> Result<()> {
    config.validate()?;
    let grid = config.grid()?;
    let dims = grid.dims();

    println!("{}", "Chunk layout".cyan().bold());
    println!("{}", "-".repeat(40).cyan());
    println!("  Volume:             {:?} + {:?}", config.volume.offset, config.volume.size);
    println!("  Grid box:           {:?} + {:?}", grid.grid_box().offset, grid.grid_box().size);
    println!("  Chunk size:         {:?}", grid.chunk_size());
    println!("  Processing overlap: {:?}", grid.processing_overlap());
    println!("  Stitch overlap:     {:?}", grid.stitch_overlap());
    println!(
        "  Chunks:             {} ({} x {} x {}), {} excluded",
        grid.chunk_count().to_string().green(),
        dims[0],
        dims[1],
        dims[2],
        config.excluded_chunks.len()
    );
    println!("  Adjacent pairs:     {}", grid.adjacent_pairs().len());
    for channel in &config.channels {
        println!(
            "  Channel {:<10} threshold {} sigma {:?}",
            channel.name.yellow(),
            channel.effective_threshold(),
            channel.sigma
        );
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!();
    println!("{}", "=".repeat(50).cyan());
    for channel in &report.channels {
        println!(
            "{} {}: {} objects, {} ids merged, {} partner pairs",
            "[+]".green(),
            channel.channel.cyan(),
            channel.object_count.to_string().green(),
            channel.merged_ids,
            channel.partners.len()
        );
    }
    println!(
        "{} Run '{}': {} objects in {}",
        "[+]".green(),
        report.run_id,
        report.object_count(),
        format_duration(report.total_duration())
    );
}
