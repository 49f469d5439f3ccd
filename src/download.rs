use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::error::PipelineError;
use crate::manifest::{ChecksumManifest, ManifestVerifier, VerificationReport};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::remote::{RemoteSource, download_matching};

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub prefix: String,
    pub retry_budget: u32,
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub directory: Utf8PathBuf,
    pub files: Vec<String>,
    pub attempts: u32,
    pub verification: VerificationReport,
}

pub struct DownloadSession<'a> {
    dir: &'a Utf8Path,
    options: DownloadOptions,
}

impl<'a> DownloadSession<'a> {
    pub fn new(dir: &'a Utf8Path, options: DownloadOptions) -> Self {
        Self { dir, options }
    }

    /// Downloads then verifies the whole file set, repeating both steps
    /// until every checksum matches. Fails once `retry_budget` attempts
    /// have all failed verification.
    pub fn run(
        &self,
        remote: &mut dyn RemoteSource,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, PipelineError> {
        let verifier = ManifestVerifier::new(self.dir, self.options.chunk_size);

        for attempt in 1..=self.options.retry_budget {
            sink.event(ProgressEvent::info(format!(
                "Download attempt {attempt} of {}",
                self.options.retry_budget
            )));
            let files = download_matching(remote, &self.options.prefix, self.dir, sink)?;
            let manifest = ChecksumManifest::from_downloads(self.dir, &files)?;
            if manifest.is_empty() {
                sink.event(ProgressEvent::warn(format!(
                    "No checksum files found for {}, downloads are not verified",
                    self.options.prefix
                )));
            }

            let verification = verifier.verify(&manifest, sink)?;
            if verification.is_success() {
                return Ok(DownloadResult {
                    directory: self.dir.to_path_buf(),
                    files,
                    attempts: attempt,
                    verification,
                });
            }
        }

        Err(PipelineError::RetryBudgetExhausted {
            attempts: self.options.retry_budget,
        })
    }
}
