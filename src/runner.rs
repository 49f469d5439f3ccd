use std::fs::{self, File};
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::UnitKey;
use crate::error::PipelineError;
use crate::fs_util;
use crate::grouping::ProcessingUnit;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    Failed { code: Option<i32> },
}

impl From<std::process::ExitStatus> for JobStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if status.success() {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed {
                code: status.code(),
            }
        }
    }
}

/// The external work done for one unit.
pub trait UnitJob {
    /// Human readable command line, written to the log and progress output.
    fn describe(&self, unit: &ProcessingUnit) -> Result<String, PipelineError>;

    /// Intermediate files to delete once the job has finished, whatever its outcome.
    fn scratch_artifacts(&self, unit: &ProcessingUnit) -> Vec<Utf8PathBuf> {
        let _ = unit;
        Vec::new()
    }

    /// Runs the job with stdout and stderr going to `log`.
    fn run(&self, unit: &ProcessingUnit, log: &File) -> Result<JobStatus, PipelineError>;
}

/// Deletes scratch files when dropped, so cleanup happens on every path out
/// of a unit. Files that never got created are ignored.
pub struct ScratchGuard<'a> {
    paths: Vec<Utf8PathBuf>,
    sink: &'a dyn ProgressSink,
}

impl<'a> ScratchGuard<'a> {
    pub fn new(paths: Vec<Utf8PathBuf>, sink: &'a dyn ProgressSink) -> Self {
        Self { paths, sink }
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        for path in &self.paths {
            match fs_util::remove_if_exists(path) {
                Ok(true) => self
                    .sink
                    .event(ProgressEvent::info(format!("Removed intermediate file {path}"))),
                Ok(false) => {}
                Err(err) => self.sink.event(ProgressEvent::warn(format!(
                    "Unable to remove intermediate file {path}: {err}"
                ))),
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedUnit {
    pub key: UnitKey,
    pub reason: String,
    pub log: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub processed: Vec<UnitKey>,
    pub skipped: Vec<UnitKey>,
    pub failed: Vec<FailedUnit>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.processed.len() + self.skipped.len() + self.failed.len()
    }

    pub fn report(&self, sink: &dyn ProgressSink) {
        sink.event(ProgressEvent::info(format!(
            "Summary: {} processed, {} already done, {} failed",
            self.processed.len(),
            self.skipped.len(),
            self.failed.len()
        )));
        for failed in &self.failed {
            let log = failed
                .log
                .as_ref()
                .map(|path| format!(" (see {path})"))
                .unwrap_or_default();
            sink.event(ProgressEvent::warn(format!(
                "{} failed: {}{log}",
                failed.key, failed.reason
            )));
        }
    }

    pub fn into_result(self) -> Result<Self, PipelineError> {
        if self.failed.is_empty() {
            return Ok(self);
        }
        Err(PipelineError::UnitsFailed {
            failed: self.failed.len(),
            total: self.total(),
            units: self
                .failed
                .iter()
                .map(|failed| failed.key.to_string())
                .collect(),
        })
    }
}

enum UnitOutcome {
    Done,
    Failed(String),
}

pub struct PipelineRunner<'a, J: UnitJob> {
    workspace: &'a Workspace,
    job: J,
}

impl<'a, J: UnitJob> PipelineRunner<'a, J> {
    pub fn new(workspace: &'a Workspace, job: J) -> Self {
        Self { workspace, job }
    }

    pub fn job(&self) -> &J {
        &self.job
    }

    /// Processes units one after another in the given order. A unit with a
    /// completion marker is skipped; a failing unit is recorded and the
    /// run moves on to the next one.
    pub fn run(
        &self,
        units: &[ProcessingUnit],
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();

        for (position, unit) in units.iter().enumerate() {
            sink.event(ProgressEvent::info(format!(
                "Processing unit {} of {}: {}",
                position + 1,
                units.len(),
                unit.key
            )));

            if self.workspace.is_complete(&unit.key) {
                sink.event(ProgressEvent::warn(format!(
                    "{} already processed, skipping",
                    unit.key
                )));
                summary.skipped.push(unit.key.clone());
                continue;
            }

            match self.process(unit, sink)? {
                UnitOutcome::Done => summary.processed.push(unit.key.clone()),
                UnitOutcome::Failed(reason) => {
                    let log = self.workspace.failed_log_path(&unit.key);
                    summary.failed.push(FailedUnit {
                        key: unit.key.clone(),
                        reason,
                        log: log.as_std_path().exists().then_some(log),
                    });
                }
            }
        }

        summary.report(sink);
        Ok(summary)
    }

    fn process(
        &self,
        unit: &ProcessingUnit,
        sink: &dyn ProgressSink,
    ) -> Result<UnitOutcome, PipelineError> {
        let command = match self.job.describe(unit) {
            Ok(command) => command,
            Err(err) => return Ok(UnitOutcome::Failed(err.to_string())),
        };
        sink.event(ProgressEvent::info(command.clone()));

        let running = self.workspace.running_log_path(&unit.key);
        let log = match File::create(running.as_std_path()) {
            Ok(log) => log,
            Err(err) => {
                return Ok(UnitOutcome::Failed(format!("create log {running}: {err}")));
            }
        };
        let _ = writeln!(
            &log,
            "Sample read file prefix: {}\nStarted: {}\nCommand: {command}\n",
            unit.key,
            chrono::Local::now().to_rfc3339()
        );

        let status = {
            let _scratch = ScratchGuard::new(self.job.scratch_artifacts(unit), sink);
            self.job.run(unit, &log)
        };

        let reason = match status {
            Ok(JobStatus::Succeeded) => {
                let _ = writeln!(&log, "\nFinished: {}", chrono::Local::now().to_rfc3339());
                drop(log);
                move_log(&running, &self.workspace.marker_path(&unit.key))?;
                return Ok(UnitOutcome::Done);
            }
            Ok(JobStatus::Failed { code: Some(code) }) => format!("exited with status {code}"),
            Ok(JobStatus::Failed { code: None }) => "terminated by a signal".to_string(),
            Err(err) => err.to_string(),
        };

        let _ = writeln!(&log, "\nFailed: {reason}");
        drop(log);
        move_log(&running, &self.workspace.failed_log_path(&unit.key))?;
        sink.event(ProgressEvent::warn(format!("{} {reason}", unit.key)));
        Ok(UnitOutcome::Failed(reason))
    }
}

/// Only a successful unit's log reaches the completion marker path.
fn move_log(from: &Utf8Path, to: &Utf8Path) -> Result<(), PipelineError> {
    fs::rename(from.as_std_path(), to.as_std_path())
        .map_err(|err| PipelineError::Filesystem(format!("move {from} to {to}: {err}")))
}
