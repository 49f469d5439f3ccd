use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::process::{Command, Stdio};

use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use regex::Regex;
use tempfile::NamedTempFile;

use crate::config::ToolPaths;
use crate::domain::{FASTQ_GZ_SUFFIX, MERGED_TAG, MergeBackend, ReadLayout, UnitKey};
use crate::error::PipelineError;
use crate::grouping::{ProcessingUnit, UnitMembers};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::runner::{JobStatus, UnitJob};
use crate::workspace::Workspace;

/// Builds one merge unit per sample index (per index and pair tag for
/// paired data). Each unit holds the lane files of that sample, sorted.
/// Indexes without any file are reported and left out.
pub fn prepare_merge_units(
    files: &[String],
    indexes: &[String],
    layout: &ReadLayout,
    sink: &dyn ProgressSink,
) -> Result<Vec<ProcessingUnit>, PipelineError> {
    let mut units = Vec::new();

    for index in indexes {
        let mut indexed = files
            .iter()
            .filter(|name| name.contains(index.as_str()) && name.ends_with(FASTQ_GZ_SUFFIX))
            .cloned()
            .collect::<Vec<_>>();
        indexed.sort();

        let groups = match layout {
            ReadLayout::Single => vec![(UnitKey::new(index.as_str()), indexed)],
            ReadLayout::Paired(tags) => {
                let mut groups = Vec::new();
                for tag in tags.as_array() {
                    let matcher = pair_matcher(tag)?;
                    let members = indexed
                        .iter()
                        .filter(|name| matcher.is_match(name))
                        .cloned()
                        .collect::<Vec<_>>();
                    groups.push((UnitKey::new(format!("{index}_{tag}")), members));
                }
                groups
            }
        };

        for (key, members) in groups {
            sink.event(ProgressEvent::info(format!(
                "{} files found for {key}",
                members.len()
            )));
            if members.is_empty() {
                sink.event(ProgressEvent::warn(format!(
                    "No files to merge for {key}, skipping"
                )));
                continue;
            }
            units.push(ProcessingUnit {
                key,
                members: UnitMembers::Lanes(members),
            });
        }
    }

    Ok(units)
}

fn pair_matcher(tag: &str) -> Result<Regex, PipelineError> {
    Regex::new(&format!(r"^.*?{}\.fq\.gz", regex::escape(tag)))
        .map_err(|err| PipelineError::MalformedFilename(err.to_string()))
}

/// Derives the merged file name by replacing the lane tag with `merged`.
/// All files of a unit must collapse onto the same name.
pub fn merged_file_name(
    key: &UnitKey,
    files: &[&str],
    lane_tags: &[String],
) -> Result<String, PipelineError> {
    let mut candidates = BTreeSet::new();
    for tag in lane_tags.iter().filter(|tag| !tag.is_empty()) {
        for file in files.iter().filter(|file| file.contains(tag.as_str())) {
            candidates.insert(file.replace(tag.as_str(), MERGED_TAG));
        }
    }

    let mut candidates = candidates.into_iter();
    match (candidates.next(), candidates.next()) {
        (Some(name), None) => Ok(name),
        (None, _) => Err(PipelineError::NoMergeCandidate(key.to_string())),
        (Some(first), Some(second)) => Err(PipelineError::NamingConflict {
            unit: key.to_string(),
            candidates: [first, second].into_iter().chain(candidates).collect(),
        }),
    }
}

/// Concatenates the lane files of one unit into a single gzip file.
pub struct MergeJob<'a> {
    workspace: &'a Workspace,
    lane_tags: Vec<String>,
    backend: MergeBackend,
    tools: ToolPaths,
}

impl<'a> MergeJob<'a> {
    pub fn new(
        workspace: &'a Workspace,
        lane_tags: Vec<String>,
        backend: MergeBackend,
        tools: ToolPaths,
    ) -> Self {
        Self {
            workspace,
            lane_tags,
            backend,
            tools,
        }
    }

    pub fn output_path(&self, unit: &ProcessingUnit) -> Result<Utf8PathBuf, PipelineError> {
        let name = merged_file_name(&unit.key, &unit.files(), &self.lane_tags)?;
        Ok(self.workspace.output_path(&name))
    }

    fn inputs(&self, unit: &ProcessingUnit) -> Vec<Utf8PathBuf> {
        unit.files()
            .into_iter()
            .map(|name| self.workspace.input_path(name))
            .collect()
    }

    fn staging_file(&self) -> Result<NamedTempFile, PipelineError> {
        tempfile::Builder::new()
            .prefix(".merging-")
            .tempfile_in(self.workspace.output_dir().as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))
    }

    fn run_external(
        &self,
        unit: &ProcessingUnit,
        staging: &NamedTempFile,
        log: &File,
    ) -> Result<JobStatus, PipelineError> {
        let log_handle = || {
            log.try_clone()
                .map_err(|err| PipelineError::Filesystem(err.to_string()))
        };
        let output = staging
            .as_file()
            .try_clone()
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;

        let mut zcat = Command::new(&self.tools.zcat)
            .args(self.inputs(unit))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(log_handle()?))
            .spawn()
            .map_err(|err| PipelineError::MissingTool(format!("{}: {err}", self.tools.zcat)))?;
        let decompressed = zcat.stdout.take().ok_or_else(|| {
            PipelineError::Filesystem(format!("{} produced no output stream", self.tools.zcat))
        })?;

        let pigz = Command::new(&self.tools.pigz)
            .arg("-c")
            .stdin(Stdio::from(decompressed))
            .stdout(Stdio::from(output))
            .stderr(Stdio::from(log_handle()?))
            .spawn();
        let mut pigz = match pigz {
            Ok(child) => child,
            Err(err) => {
                let _ = zcat.kill();
                let _ = zcat.wait();
                return Err(PipelineError::MissingTool(format!(
                    "{}: {err}",
                    self.tools.pigz
                )));
            }
        };

        let pigz_status = pigz
            .wait()
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let zcat_status = zcat
            .wait()
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;

        if !zcat_status.success() {
            return Ok(JobStatus::from(zcat_status));
        }
        Ok(JobStatus::from(pigz_status))
    }

    fn run_native(
        &self,
        unit: &ProcessingUnit,
        staging: &NamedTempFile,
        mut log: &File,
    ) -> Result<JobStatus, PipelineError> {
        let output = staging
            .as_file()
            .try_clone()
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let mut encoder = GzEncoder::new(output, Compression::default());

        for input in self.inputs(unit) {
            let file = match File::open(input.as_std_path()) {
                Ok(file) => file,
                Err(err) => {
                    let _ = writeln!(log, "open {input}: {err}");
                    return Ok(JobStatus::Failed { code: None });
                }
            };
            let mut decoder = MultiGzDecoder::new(BufReader::new(file));
            match io::copy(&mut decoder, &mut encoder) {
                Ok(bytes) => {
                    let _ = writeln!(log, "{input}: {bytes} bytes");
                }
                Err(err) => {
                    let _ = writeln!(log, "decompress {input}: {err}");
                    return Ok(JobStatus::Failed { code: None });
                }
            }
        }

        encoder
            .finish()
            .and_then(|mut file| file.flush())
            .map_err(|err| PipelineError::Filesystem(format!("compress: {err}")))?;
        Ok(JobStatus::Succeeded)
    }
}

impl UnitJob for MergeJob<'_> {
    fn describe(&self, unit: &ProcessingUnit) -> Result<String, PipelineError> {
        let output = self.output_path(unit)?;
        let inputs = self
            .inputs(unit)
            .iter()
            .map(|path| path.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(match self.backend {
            MergeBackend::External => format!(
                "{} {inputs} | {} -c > {output}",
                self.tools.zcat, self.tools.pigz
            ),
            MergeBackend::Native => format!("gzip merge {inputs} > {output}"),
        })
    }

    fn run(&self, unit: &ProcessingUnit, log: &File) -> Result<JobStatus, PipelineError> {
        let output = self.output_path(unit)?;
        let staging = self.staging_file()?;

        let status = match self.backend {
            MergeBackend::External => self.run_external(unit, &staging, log)?,
            MergeBackend::Native => self.run_native(unit, &staging, log)?,
        };

        if status == JobStatus::Succeeded {
            staging
                .persist(output.as_std_path())
                .map_err(|err| PipelineError::Filesystem(format!("persist {output}: {err}")))?;
            let mut log = log;
            let _ = writeln!(log, "Output file {output} created");
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn lane_tags_collapse_to_one_name() {
        let key = UnitKey::new("sample");
        let name = merged_file_name(
            &key,
            &["sample.s_1.fq.gz", "sample.s_2.fq.gz"],
            &tags(&["s_1", "s_2"]),
        )
        .unwrap();
        assert_eq!(name, "sample.merged.fq.gz");
    }

    #[test]
    fn diverging_names_conflict() {
        let key = UnitKey::new("sample");
        let err = merged_file_name(
            &key,
            &["sample.s_1.r_1.fq.gz", "other.s_2.r_1.fq.gz"],
            &tags(&["s_1", "s_2"]),
        )
        .unwrap_err();
        assert_matches!(err, PipelineError::NamingConflict { candidates, .. } if candidates.len() == 2);
    }

    #[test]
    fn no_tag_match_is_an_error() {
        let key = UnitKey::new("sample");
        let err =
            merged_file_name(&key, &["sample.fq.gz"], &tags(&["s_1"])).unwrap_err();
        assert_matches!(err, PipelineError::NoMergeCandidate(_));
    }
}
