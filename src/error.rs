use camino::Utf8PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("invalid --{flag} location, directory does not exist: {path}")]
    #[diagnostic(help("create the directory before running this command"))]
    InvalidDirectory { flag: String, path: Utf8PathBuf },

    #[error("unable to locate rRNA library (.fa file): {0}")]
    MissingReferenceFasta(Utf8PathBuf),

    #[error("unable to locate rRNA library (.bt2 files) within {0}")]
    #[diagnostic(help("build the index with `bowtie2-build <library>.fa <library>`"))]
    MissingReferenceIndex(Utf8PathBuf),

    #[error("there are no gzipped fastq (.fq.gz) files within {0}")]
    NoInputFiles(Utf8PathBuf),

    #[error("filename does not follow the <prefix>.<index>.<flowcell>.<lane>.<tag>.fq.gz convention: {0}")]
    MalformedFilename(String),

    #[error("no lane tag matched any input file for {0}")]
    NoMergeCandidate(String),

    #[error("lane tags derive more than one output name for {unit}: {candidates:?}")]
    NamingConflict {
        unit: String,
        candidates: Vec<String>,
    },

    #[error("malformed checksum line {line} in {path}")]
    ManifestParse { path: Utf8PathBuf, line: usize },

    #[error("{attempts} attempts at downloading files have failed, please try again later")]
    RetryBudgetExhausted { attempts: u32 },

    #[error("missing FTP credentials: set {0}")]
    MissingCredentials(String),

    #[error("remote transfer failed: {0}")]
    Remote(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read table {path}: {message}")]
    Table { path: Utf8PathBuf, message: String },

    #[error("required tool failed to start: {0}")]
    MissingTool(String),

    #[error("{failed} of {total} units failed: {units:?}")]
    UnitsFailed {
        failed: usize,
        total: usize,
        units: Vec<String>,
    },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
