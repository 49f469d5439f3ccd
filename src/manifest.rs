use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};

use camino::Utf8Path;
use md5::{Digest, Md5};
use serde::Serialize;

use crate::domain::MANIFEST_SUFFIX;
use crate::error::PipelineError;
use crate::fs_util;
use crate::progress::{ProgressEvent, ProgressSink};

/// Expected MD5 digests keyed by file name, merged from every
/// `*.md5sums.txt` in a download batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumManifest {
    entries: BTreeMap<String, String>,
}

impl ChecksumManifest {
    pub fn parse(content: &str, source: &Utf8Path) -> Result<Self, PipelineError> {
        let mut manifest = Self::default();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (digest, file_name) =
                line.split_once("  ")
                    .ok_or_else(|| PipelineError::ManifestParse {
                        path: source.to_path_buf(),
                        line: index + 1,
                    })?;
            let file_name = file_name.trim().trim_start_matches('*');
            if digest.is_empty() || file_name.is_empty() {
                return Err(PipelineError::ManifestParse {
                    path: source.to_path_buf(),
                    line: index + 1,
                });
            }
            manifest
                .entries
                .insert(file_name.to_string(), digest.to_ascii_lowercase());
        }
        Ok(manifest)
    }

    /// Reads every manifest among `files` (names relative to `dir`).
    /// Later manifests overwrite earlier entries for the same file.
    pub fn from_downloads<S: AsRef<str>>(
        dir: &Utf8Path,
        files: &[S],
    ) -> Result<Self, PipelineError> {
        let mut merged = Self::default();
        for name in files
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| name.ends_with(MANIFEST_SUFFIX))
        {
            let path = dir.join(name);
            let content = std::fs::read_to_string(path.as_std_path())
                .map_err(|err| PipelineError::Filesystem(format!("read {path}: {err}")))?;
            merged.merge(Self::parse(&content, &path)?);
        }
        Ok(merged)
    }

    pub fn merge(&mut self, other: ChecksumManifest) {
        self.entries.extend(other.entries);
    }

    pub fn expected(&self, file_name: &str) -> Option<&str> {
        self.entries.get(file_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(file, digest)| (file.as_str(), digest.as_str()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub passed: Vec<String>,
    pub failed: Vec<String>,
    /// Listed in a manifest but not present on disk.
    pub missing: Vec<String>,
}

impl VerificationReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.missing.is_empty()
    }
}

pub fn file_md5(path: &Utf8Path, chunk_size: usize) -> io::Result<String> {
    let mut file = File::open(path.as_std_path())?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub struct ManifestVerifier<'a> {
    dir: &'a Utf8Path,
    chunk_size: usize,
}

impl<'a> ManifestVerifier<'a> {
    pub fn new(dir: &'a Utf8Path, chunk_size: usize) -> Self {
        Self { dir, chunk_size }
    }

    /// Recomputes each listed file's digest. Mismatching files are deleted
    /// straight away so the next download attempt fetches them again.
    pub fn verify(
        &self,
        manifest: &ChecksumManifest,
        sink: &dyn ProgressSink,
    ) -> Result<VerificationReport, PipelineError> {
        let mut report = VerificationReport::default();

        for (file_name, expected) in manifest.iter() {
            let path = self.dir.join(file_name);
            let computed = match file_md5(&path, self.chunk_size) {
                Ok(digest) => digest,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    sink.event(ProgressEvent::warn(format!(
                        "{file_name} is listed in a checksum file but was not downloaded"
                    )));
                    report.missing.push(file_name.to_string());
                    continue;
                }
                Err(err) => {
                    return Err(PipelineError::Filesystem(format!("hash {path}: {err}")));
                }
            };

            if computed == expected {
                sink.event(ProgressEvent::info(format!(
                    "MD5 match for {file_name} ({computed})"
                )));
                report.passed.push(file_name.to_string());
            } else {
                sink.event(ProgressEvent::warn(format!(
                    "MD5 mismatch for {file_name}: computed {computed}, expected {expected}"
                )));
                report.failed.push(file_name.to_string());
            }
        }

        if report.is_success() {
            sink.event(ProgressEvent::info(format!(
                "All {} files passed the MD5 check",
                report.passed.len()
            )));
            return Ok(report);
        }

        sink.event(ProgressEvent::warn(format!(
            "{} files did not pass the MD5 check",
            report.failed.len() + report.missing.len()
        )));
        for failed in &report.failed {
            let path = self.dir.join(failed);
            sink.event(ProgressEvent::info(format!("Deleting file {path}")));
            fs_util::remove_if_exists(&path)
                .map_err(|err| PipelineError::Filesystem(format!("remove {path}: {err}")))?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_two_space_lines() {
        let content = "d41d8cd98f00b204e9800998ecf8427e  a.fq.gz\n\nABCDEF  *b.fq.gz\n";
        let manifest = ChecksumManifest::parse(content, Utf8Path::new("x.md5sums.txt")).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(
            manifest.expected("a.fq.gz"),
            Some("d41d8cd98f00b204e9800998ecf8427e")
        );
        assert_eq!(manifest.expected("b.fq.gz"), Some("abcdef"));
    }

    #[test]
    fn parse_rejects_single_space() {
        let err = ChecksumManifest::parse("abc a.fq.gz", Utf8Path::new("x.md5sums.txt"))
            .unwrap_err();
        assert_matches!(err, PipelineError::ManifestParse { line: 1, .. });
    }

    #[test]
    fn later_manifest_wins() {
        let path = Utf8Path::new("m.md5sums.txt");
        let mut first = ChecksumManifest::parse("aaa  a.fq.gz", path).unwrap();
        first.merge(ChecksumManifest::parse("bbb  a.fq.gz", path).unwrap());
        assert_eq!(first.expected("a.fq.gz"), Some("bbb"));
    }
}
