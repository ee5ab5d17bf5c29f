//! Runs the external collection scripts as a strict sequence of child processes.

use super::*;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} could not be started: {source}")]
    Spawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} failed (exit code {code:?}): {stderr}")]
    Failed {
        stage: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("{stage} did not finish within {limit:?}")]
    TimedOut { stage: String, limit: Duration },
    #[error("{stage} could not be awaited: {source}")]
    Io {
        stage: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn stage(&self) -> &str {
        match self {
            PipelineError::Spawn { stage, .. }
            | PipelineError::Failed { stage, .. }
            | PipelineError::TimedOut { stage, .. }
            | PipelineError::Io { stage, .. } => stage,
        }
    }
}

/// One external command. The student identifier is passed as its final argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
}

impl Stage {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
        }
    }

    /// Build a stage from a whitespace-separated command line such as `node index.js`.
    /// Returns `None` if the command line is empty.
    pub fn from_command_line(name: impl Into<String>, command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(name, program, parts.collect()))
    }
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: String,
    pub elapsed: Duration,
}

/// Stages run one after another, stopping at the first that does not exit cleanly.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
    working_dir: PathBuf,
    timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>, working_dir: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            stages,
            working_dir: working_dir.into(),
            timeout,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub async fn run(&self, stuno: &str) -> Result<Vec<StageReport>, PipelineError> {
        let mut reports = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let report = self.run_stage(stage, stuno).await?;
            log::info!(
                "{} finished for {stuno} in {}ms",
                report.stage,
                report.elapsed.as_millis()
            );
            reports.push(report);
        }
        Ok(reports)
    }

    async fn run_stage(&self, stage: &Stage, stuno: &str) -> Result<StageReport, PipelineError> {
        let started_at = Instant::now();
        let name = stage.name.as_str();
        log::info!("Starting {name}: {} {} {stuno}", stage.program, stage.args.join(" "));

        let mut child = Command::new(&stage.program)
            .args(&stage.args)
            .arg(stuno)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                stage: name.to_string(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let relay_stdout = async move {
            if let Some(stdout) = stdout {
                for_each_line(stdout, name, |line| log::info!("[{name}] {line}")).await;
            }
        };
        let collect_stderr = async move {
            let mut buffer = String::new();
            if let Some(stderr) = stderr {
                for_each_line(stderr, name, |line| {
                    log::warn!("[{name} ERROR] {line}");
                    buffer.push_str(line);
                    buffer.push('\n');
                })
                .await;
            }
            buffer
        };
        let finished = async {
            let ((), stderr_text, status) = tokio::join!(relay_stdout, collect_stderr, child.wait());
            (stderr_text, status)
        };

        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, finished).await.ok(),
            None => Some(finished.await),
        };

        let Some((stderr_text, status)) = outcome else {
            let limit = self.timeout.unwrap_or_default();
            log::error!("{name} for {stuno} exceeded {limit:?}, killing it");
            if let Err(e) = child.kill().await {
                log::warn!("Failed to kill {name}: {e}");
            }
            return Err(PipelineError::TimedOut {
                stage: name.to_string(),
                limit,
            });
        };

        let status = status.map_err(|source| PipelineError::Io {
            stage: name.to_string(),
            source,
        })?;
        if !status.success() {
            return Err(PipelineError::Failed {
                stage: name.to_string(),
                code: status.code(),
                stderr: stderr_text.trim_end().to_string(),
            });
        }

        Ok(StageReport {
            stage: name.to_string(),
            elapsed: started_at.elapsed(),
        })
    }
}

/// Read a child's output stream to the end, one line at a time.
/// Lines that are not UTF-8 are decoded lossily so the pipe is always drained.
async fn for_each_line<R: AsyncRead + Unpin>(
    stream: R,
    stage: &str,
    mut on_line: impl FnMut(&str),
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                on_line(line.trim_end_matches(['\n', '\r']));
            }
            Err(e) => {
                log::warn!("Stopped reading output of {stage}: {e}");
                break;
            }
        }
    }
}
