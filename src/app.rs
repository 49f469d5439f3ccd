use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::aligner::{Bowtie2Job, check_rrna_library};
use crate::config::ResolvedConfig;
use crate::domain::{MergeBackend, ReadLayout};
use crate::download::{DownloadOptions, DownloadResult, DownloadSession};
use crate::error::PipelineError;
use crate::fs_util;
use crate::grouping::{GroupingReport, UnitGrouper};
use crate::merge::{MergeJob, prepare_merge_units};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::remote::RemoteSource;
use crate::runner::{PipelineRunner, RunSummary};
use crate::samples::{self, SampleEntry};
use crate::workspace::{MERGE_SUBFOLDER, RRNA_SUBFOLDER, Workspace};

#[derive(Debug, Clone)]
pub struct RrnaRequest {
    pub directory: Utf8PathBuf,
    pub library: Utf8PathBuf,
    pub layout: ReadLayout,
}

#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub directory: Utf8PathBuf,
    pub lane_tags: Vec<String>,
    pub layout: ReadLayout,
    pub indexes: Vec<String>,
    pub backend: Option<MergeBackend>,
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub directory: Utf8PathBuf,
    pub prefix: String,
    pub sample_sheet: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub output_dir: Utf8PathBuf,
    pub grouping: GroupingReport,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub download: DownloadResult,
    pub samples_table: Option<Utf8PathBuf>,
}

pub struct App {
    config: ResolvedConfig,
}

impl App {
    pub fn new(config: ResolvedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Removes rRNA reads from every unit in the directory that has not
    /// been processed yet.
    pub fn remove_rrna(
        &self,
        request: RrnaRequest,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, PipelineError> {
        let directory = fs_util::check_directory(&request.directory, "directory")?;
        let library = check_rrna_library(&request.library, sink)?;
        let files = fs_util::list_fastq_files(&directory)?;
        sink.event(ProgressEvent::info(format!(
            "{} gzipped fastq files found, grouping as {}",
            files.len(),
            request.layout
        )));

        let grouped = UnitGrouper::new(&request.layout).group(&files);
        report_grouping(&grouped.report, sink);

        let workspace = Workspace::new(directory, RRNA_SUBFOLDER);
        workspace.ensure_output_dirs(sink)?;
        let job = Bowtie2Job::new(
            self.config.tools.bowtie2.clone(),
            library,
            request.layout,
            self.config.aligner.clone(),
            &workspace,
        );
        let summary = PipelineRunner::new(&workspace, job).run(&grouped.units, sink)?;

        Ok(RunResult {
            output_dir: workspace.output_dir().to_path_buf(),
            grouping: grouped.report,
            summary,
        })
    }

    /// Concatenates the lane files of each sample index into one file.
    pub fn merge_lanes(
        &self,
        request: MergeRequest,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, PipelineError> {
        let directory = fs_util::check_directory(&request.directory, "directory")?;
        let files = fs_util::list_fastq_files(&directory)?;
        let units = prepare_merge_units(&files, &request.indexes, &request.layout, sink)?;

        let workspace = Workspace::new(directory, MERGE_SUBFOLDER);
        workspace.ensure_output_dirs(sink)?;
        let backend = request.backend.unwrap_or(self.config.merge_backend);
        sink.event(ProgressEvent::info(format!(
            "Beginning lane merger for {} units ({backend} backend)",
            units.len()
        )));
        let job = MergeJob::new(
            &workspace,
            request.lane_tags,
            backend,
            self.config.tools.clone(),
        );
        let summary = PipelineRunner::new(&workspace, job).run(&units, sink)?;

        Ok(RunResult {
            output_dir: workspace.output_dir().to_path_buf(),
            grouping: GroupingReport::default(),
            summary,
        })
    }

    /// Downloads and verifies the files for one sequencing submission, then
    /// writes `samples.csv` when a sample sheet is given.
    pub fn download(
        &self,
        request: DownloadRequest,
        remote: &mut dyn RemoteSource,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, PipelineError> {
        let directory = fs_util::check_directory(&request.directory, "directory")?;
        let sample_entries = match &request.sample_sheet {
            Some(path) => Some(read_sheet(path, sink)?),
            None => None,
        };

        let session = DownloadSession::new(
            &directory,
            DownloadOptions {
                prefix: request.prefix.clone(),
                retry_budget: self.config.retry_budget,
                chunk_size: self.config.chunk_size,
            },
        );
        let download = session.run(remote, sink)?;

        let samples_table = match sample_entries {
            Some(entries) => Some(samples::write_samples_table(
                &directory,
                &request.prefix,
                &entries,
                &download.files,
                sink,
            )?),
            None => None,
        };

        Ok(FetchResult {
            download,
            samples_table,
        })
    }
}

/// Sample indexes from the sheet, for commands that take them from there.
pub fn sheet_indexes(
    path: &Utf8Path,
    sink: &dyn ProgressSink,
) -> Result<Vec<String>, PipelineError> {
    Ok(read_sheet(path, sink)?
        .into_iter()
        .map(|entry| entry.index)
        .collect())
}

fn read_sheet(path: &Utf8Path, sink: &dyn ProgressSink) -> Result<Vec<SampleEntry>, PipelineError> {
    sink.event(ProgressEvent::info(format!("Reading sample sheet {path}")));
    let entries = samples::read_sample_sheet(path)?;
    sink.event(ProgressEvent::info(format!(
        "{} samples listed in the sample sheet",
        entries.len()
    )));
    Ok(entries)
}

fn report_grouping(report: &GroupingReport, sink: &dyn ProgressSink) {
    for file in &report.malformed {
        sink.event(ProgressEvent::warn(format!(
            "{file} does not follow the naming convention, ignoring it"
        )));
    }
    for file in &report.overwritten {
        sink.event(ProgressEvent::warn(format!(
            "{file} shares its unit with a later file and was replaced"
        )));
    }
    for file in &report.unmatched {
        sink.event(ProgressEvent::warn(format!(
            "{file} matches neither pair tag, ignoring it"
        )));
    }
    for key in &report.incomplete {
        sink.event(ProgressEvent::warn(format!(
            "{key} is missing one read of its pair"
        )));
    }
}
