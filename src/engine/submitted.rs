// Mon Oct 19 2026 - Alex

//! Batch execution through separately scheduled worker processes.
//!
//! Each batch is written to `storage/job_<i>.json`, handed to a
//! [`JobSubmitter`], and its result is read back from `out/job_<i>.json`
//! once no job carrying the stage's name prefix is pending anymore.

use crate::engine::error::PipelineError;
use crate::engine::params::{JobEnvelope, JobOutput, JobParams, JobResultFile, WorkerEnv};
use crate::engine::result::BatchOutcome;
use crate::engine::runner::{JobRunner, WorkerFn};
use crate::engine::stage::StageKind;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// One submitted batch.
#[derive(Debug, Clone)]
pub struct SubmittedJob {
    pub name: String,
    pub stage: StageKind,
    pub params_path: PathBuf,
    pub out_path: PathBuf,
}

pub trait JobSubmitter: Send + Sync {
    fn submit(&self, job: &SubmittedJob) -> Result<(), PipelineError>;

    /// Number of submitted jobs whose name starts with `prefix` that have
    /// not finished yet.
    fn pending(&self, prefix: &str) -> Result<usize, PipelineError>;
}

/// Spawns `object-extractor worker` child processes on this machine.
pub struct ProcessSubmitter {
    executable: PathBuf,
    children: Mutex<Vec<(String, Child)>>,
}

impl ProcessSubmitter {
    pub fn new(executable: PathBuf) -> Self {
        Self {
            executable,
            children: Mutex::new(Vec::new()),
        }
    }

    /// Uses the running binary as the worker executable.
    pub fn current_exe() -> Result<Self, PipelineError> {
        Ok(Self::new(std::env::current_exe()?))
    }
}

impl JobSubmitter for ProcessSubmitter {
    fn submit(&self, job: &SubmittedJob) -> Result<(), PipelineError> {
        let child = Command::new(&self.executable)
            .arg("worker")
            .arg("--stage")
            .arg(job.stage.as_str())
            .arg("--params")
            .arg(&job.params_path)
            .arg("--out")
            .arg(&job.out_path)
            .stdin(Stdio::null())
            .spawn()?;
        log::debug!("Spawned {} as pid {}", job.name, child.id());
        self.children.lock().push((job.name.clone(), child));
        Ok(())
    }

    fn pending(&self, prefix: &str) -> Result<usize, PipelineError> {
        let mut children = self.children.lock();
        let mut running = 0;
        let mut finished = Vec::new();
        for (i, (name, child)) in children.iter_mut().enumerate() {
            match child.try_wait()? {
                Some(status) => {
                    if !status.success() {
                        log::warn!("{} exited with {}", name, status);
                    }
                    finished.push(i);
                }
                None if name.starts_with(prefix) => running += 1,
                None => {}
            }
        }
        for i in finished.into_iter().rev() {
            children.swap_remove(i);
        }
        Ok(running)
    }
}

/// Submits through external commands, e.g. a cluster queue.
///
/// `submit_template` is run through `sh -c` after substituting `{name}`,
/// `{stage}`, `{params}`, `{out}` and `{exe}`. `status_command` must print
/// one line per queued or running job; lines containing the job name prefix
/// count as pending. Queues that truncate job names are handled by
/// matching only the first `name_width` characters of the prefix.
pub struct CommandSubmitter {
    pub submit_template: String,
    pub status_command: String,
    pub executable: PathBuf,
    pub name_width: usize,
}

impl CommandSubmitter {
    pub fn new(submit_template: &str, status_command: &str, executable: PathBuf) -> Self {
        Self {
            submit_template: submit_template.to_string(),
            status_command: status_command.to_string(),
            executable,
            name_width: 10,
        }
    }

    fn render(&self, job: &SubmittedJob) -> String {
        self.submit_template
            .replace("{name}", &job.name)
            .replace("{stage}", job.stage.as_str())
            .replace("{params}", &job.params_path.display().to_string())
            .replace("{out}", &job.out_path.display().to_string())
            .replace("{exe}", &self.executable.display().to_string())
    }

    fn shell(command: &str) -> Result<String, PipelineError> {
        let output = Command::new("sh").arg("-c").arg(command).output()?;
        if !output.status.success() {
            return Err(PipelineError::Io(std::io::Error::other(format!(
                "'{}' exited with {}: {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl JobSubmitter for CommandSubmitter {
    fn submit(&self, job: &SubmittedJob) -> Result<(), PipelineError> {
        let out = Self::shell(&self.render(job))?;
        log::debug!("Submitted {}: {}", job.name, out.trim());
        Ok(())
    }

    fn pending(&self, prefix: &str) -> Result<usize, PipelineError> {
        let key: String = prefix.chars().take(self.name_width.max(1)).collect();
        let listing = Self::shell(&self.status_command)?;
        Ok(listing.lines().filter(|line| line.contains(&key)).count())
    }
}

pub struct SubmittedJobRunner {
    root: PathBuf,
    env: WorkerEnv,
    submitter: Box<dyn JobSubmitter>,
    poll_interval: Duration,
    timeout: Option<Duration>,
    job_prefix: String,
}

impl SubmittedJobRunner {
    pub fn new<P: AsRef<Path>>(root: P, env: WorkerEnv, submitter: Box<dyn JobSubmitter>) -> Self {
        let job_prefix = format!("ox{}", env.channel.chars().take(3).collect::<String>());
        Self {
            root: root.as_ref().to_path_buf(),
            env,
            submitter,
            poll_interval: Duration::from_secs(1),
            timeout: None,
            job_prefix,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_job_prefix(mut self, prefix: &str) -> Self {
        self.job_prefix = prefix.to_string();
        self
    }

    fn stage_prefix(&self, stage: StageKind) -> String {
        format!("{}{}", self.job_prefix, &stage.as_str()[..2])
    }

    fn stage_dirs(&self, stage: StageKind) -> Result<(PathBuf, PathBuf), PipelineError> {
        let dir = self.root.join(stage.as_str());
        let storage = dir.join("storage");
        let out = dir.join("out");
        fs::create_dir_all(&storage)?;
        fs::create_dir_all(&out)?;
        Ok((storage, out))
    }

    fn wait_for(&self, prefix: &str) -> Result<(), PipelineError> {
        let start = Instant::now();
        loop {
            let pending = self.submitter.pending(prefix)?;
            if pending == 0 {
                return Ok(());
            }
            if let Some(timeout) = self.timeout {
                if start.elapsed() > timeout {
                    log::warn!("Gave up waiting for {} pending '{}' jobs", pending, prefix);
                    return Ok(());
                }
            }
            log::debug!("{} '{}' jobs pending", pending, prefix);
            thread::sleep(self.poll_interval);
        }
    }

    fn submit_all(
        &self,
        stage: StageKind,
        batches: &[(usize, JobParams)],
    ) -> Result<Vec<(usize, SubmittedJob, String)>, PipelineError> {
        let (storage, out) = self.stage_dirs(stage)?;
        let prefix = self.stage_prefix(stage);
        let mut jobs = Vec::with_capacity(batches.len());
        for (batch_id, params) in batches {
            let envelope = JobEnvelope {
                batch_id: *batch_id,
                env: self.env.clone(),
                params: params.clone(),
            };
            let params_json = serde_json::to_string(&envelope)?;
            let job = SubmittedJob {
                name: format!("{}_{}", prefix, batch_id),
                stage,
                params_path: storage.join(format!("job_{}.json", batch_id)),
                out_path: out.join(format!("job_{}.json", batch_id)),
            };
            fs::write(&job.params_path, &params_json)?;
            if job.out_path.exists() {
                fs::remove_file(&job.out_path)?;
            }
            jobs.push((*batch_id, job, params_json));
        }
        for (_, job, _) in &jobs {
            self.submitter.submit(job)?;
        }
        Ok(jobs)
    }

    fn read_result(
        stage: StageKind,
        batch_id: usize,
        job: &SubmittedJob,
        params_json: &str,
    ) -> Result<JobOutput, PipelineError> {
        if !job.out_path.exists() {
            return Err(PipelineError::Scheduling {
                stage,
                missing: vec![batch_id],
                detail: format!("{} wrote no result; params: {}", job.name, params_json),
            });
        }
        let file: JobResultFile = serde_json::from_slice(&fs::read(&job.out_path)?)?;
        match file {
            JobResultFile::Ok(output) => Ok(output),
            JobResultFile::Err { kind, message } if kind.is_retryable() => Err(PipelineError::Scheduling {
                stage,
                missing: vec![batch_id],
                detail: message,
            }),
            JobResultFile::Err { kind, message } => Err(PipelineError::Worker {
                stage,
                batch_id,
                kind,
                message,
            }),
        }
    }
}

impl JobRunner for SubmittedJobRunner {
    fn name(&self) -> &str {
        "submitted"
    }

    /// The in-process worker is not used; each batch runs in its own job.
    fn run(&self, stage: StageKind, batches: &[(usize, JobParams)], _worker: &WorkerFn) -> Vec<BatchOutcome> {
        let start = Instant::now();
        let jobs = match self.submit_all(stage, batches) {
            Ok(jobs) => jobs,
            Err(e) => {
                log::error!("{}: submission failed: {}", stage, e);
                let reason = e.to_string();
                return batches
                    .iter()
                    .map(|(batch_id, _)| {
                        let err = PipelineError::Scheduling {
                            stage,
                            missing: vec![*batch_id],
                            detail: reason.clone(),
                        };
                        BatchOutcome::new(*batch_id, Err(err), start.elapsed())
                    })
                    .collect();
            }
        };

        if let Err(e) = self.wait_for(&self.stage_prefix(stage)) {
            log::error!("{}: polling failed: {}", stage, e);
        }

        let elapsed = start.elapsed();
        jobs.iter()
            .map(|(batch_id, job, params_json)| {
                BatchOutcome::new(*batch_id, Self::read_result(stage, *batch_id, job, params_json), elapsed)
            })
            .collect()
    }
}
