use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::UnitKey;
use crate::error::PipelineError;
use crate::progress::{ProgressEvent, ProgressSink};

pub const RRNA_SUBFOLDER: &str = "rRNA_processed";
pub const MERGE_SUBFOLDER: &str = "lane_merged";
pub const LOG_SUBFOLDER: &str = "log_files";

/// Directories one tool run reads from and writes to.
#[derive(Debug, Clone)]
pub struct Workspace {
    working_dir: Utf8PathBuf,
    output_dir: Utf8PathBuf,
}

impl Workspace {
    pub fn new(working_dir: impl Into<Utf8PathBuf>, subfolder: &str) -> Self {
        let working_dir = working_dir.into();
        let output_dir = working_dir.join(subfolder);
        Self {
            working_dir,
            output_dir,
        }
    }

    pub fn working_dir(&self) -> &Utf8Path {
        &self.working_dir
    }

    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    pub fn log_dir(&self) -> Utf8PathBuf {
        self.output_dir.join(LOG_SUBFOLDER)
    }

    pub fn input_path(&self, file_name: &str) -> Utf8PathBuf {
        self.working_dir.join(file_name)
    }

    pub fn output_path(&self, file_name: &str) -> Utf8PathBuf {
        self.output_dir.join(file_name)
    }

    /// The per-unit log whose existence marks the unit as done.
    pub fn marker_path(&self, key: &UnitKey) -> Utf8PathBuf {
        self.log_dir().join(format!("logs_{key}.txt"))
    }

    /// Where the log is written while the unit runs. An interrupted run
    /// leaves it here, which does not count as done.
    pub fn running_log_path(&self, key: &UnitKey) -> Utf8PathBuf {
        self.log_dir().join(format!("logs_{key}.running.txt"))
    }

    pub fn failed_log_path(&self, key: &UnitKey) -> Utf8PathBuf {
        self.log_dir().join(format!("logs_{key}.failed.txt"))
    }

    pub fn is_complete(&self, key: &UnitKey) -> bool {
        self.marker_path(key).as_std_path().exists()
    }

    pub fn ensure_output_dirs(&self, sink: &dyn ProgressSink) -> Result<(), PipelineError> {
        for dir in [self.output_dir.clone(), self.log_dir()] {
            if dir.as_std_path().is_dir() {
                continue;
            }
            sink.event(ProgressEvent::info(format!("Creating sub-folder {dir}")));
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| PipelineError::Filesystem(format!("create {dir}: {err}")))?;
        }
        sink.event(ProgressEvent::info(format!(
            "Newly generated files will be stored within {}",
            self.output_dir
        )));
        Ok(())
    }
}
