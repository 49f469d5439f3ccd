use std::fs::{self, File};
use std::process::{Command, Stdio};

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::AlignerSettings;
use crate::domain::ReadLayout;
use crate::error::PipelineError;
use crate::grouping::{ProcessingUnit, UnitMembers};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::runner::{JobStatus, UnitJob};
use crate::workspace::Workspace;

/// Checks that the rRNA `.fa` exists and that bowtie2 index files
/// (`<stem>*.bt2`) sit next to it.
pub fn check_rrna_library(
    library: &Utf8Path,
    sink: &dyn ProgressSink,
) -> Result<Utf8PathBuf, PipelineError> {
    let dir = match library.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    if !dir.as_std_path().is_dir() {
        return Err(PipelineError::InvalidDirectory {
            flag: "library".to_string(),
            path: dir.to_path_buf(),
        });
    }
    if !library.as_std_path().is_file() {
        return Err(PipelineError::MissingReferenceFasta(library.to_path_buf()));
    }

    let stem = library.file_stem().unwrap_or_default();
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| PipelineError::Filesystem(format!("read {dir}: {err}")))?;
    let has_index = entries.flatten().any(|entry| {
        entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with(stem) && name.ends_with(".bt2"))
            .unwrap_or(false)
    });
    if !has_index {
        return Err(PipelineError::MissingReferenceIndex(dir.to_path_buf()));
    }
    sink.event(ProgressEvent::info(format!("rRNA library {library} appears valid")));
    Ok(library.to_path_buf())
}

/// Removes rRNA reads from one unit by aligning against the rRNA index and
/// keeping the reads that fail to align.
pub struct Bowtie2Job<'a> {
    program: String,
    library: Utf8PathBuf,
    layout: ReadLayout,
    settings: AlignerSettings,
    workspace: &'a Workspace,
}

impl<'a> Bowtie2Job<'a> {
    pub fn new(
        program: impl Into<String>,
        library: Utf8PathBuf,
        layout: ReadLayout,
        settings: AlignerSettings,
        workspace: &'a Workspace,
    ) -> Self {
        Self {
            program: program.into(),
            library,
            layout,
            settings,
            workspace,
        }
    }

    pub fn sam_path(&self, unit: &ProcessingUnit) -> Utf8PathBuf {
        self.workspace
            .output_path(&format!("ribo_aligns_{}.sam", unit.key))
    }

    /// bowtie2 substitutes `%` with the mate number.
    pub fn unaligned_pattern(&self, unit: &ProcessingUnit) -> Utf8PathBuf {
        self.workspace
            .output_path(&format!("{}_rRNA_processed_r_%.fq.gz", unit.key))
    }

    pub fn arguments(&self, unit: &ProcessingUnit) -> Result<Vec<String>, PipelineError> {
        let settings = &self.settings;
        let mut args = vec![
            "--phred33".to_string(),
            "-D".to_string(),
            settings.seed_extension_attempts.to_string(),
            "-R".to_string(),
            settings.reseed_rounds.to_string(),
            "-N".to_string(),
            settings.seed_mismatches.to_string(),
            "-L".to_string(),
            settings.seed_length.to_string(),
            "-i".to_string(),
            settings.seed_interval.clone(),
            "-x".to_string(),
            self.index_base().to_string(),
            "-S".to_string(),
            self.sam_path(unit).to_string(),
            "--un-conc-gz".to_string(),
            self.unaligned_pattern(unit).to_string(),
            "--np".to_string(),
            "0".to_string(),
        ];

        let input = |name: &str| self.workspace.input_path(name).to_string();
        match (&self.layout, &unit.members) {
            (ReadLayout::Paired(_), UnitMembers::Paired { first, second }) => {
                args.extend([
                    "-1".to_string(),
                    first.as_deref().map(input).unwrap_or_default(),
                    "-2".to_string(),
                    second.as_deref().map(input).unwrap_or_default(),
                    "-X".to_string(),
                    settings.max_fragment_length.to_string(),
                    "--dovetail".to_string(),
                ]);
            }
            (ReadLayout::Single, UnitMembers::Single(file)) => {
                args.extend(["-U".to_string(), input(file.as_str())]);
            }
            _ => {
                return Err(PipelineError::MalformedFilename(format!(
                    "{} does not match the {} layout",
                    unit.key, self.layout
                )));
            }
        }
        Ok(args)
    }

    /// bowtie2 takes the index basename, which is the library path without `.fa`.
    fn index_base(&self) -> Utf8PathBuf {
        self.library.with_extension("")
    }
}

impl UnitJob for Bowtie2Job<'_> {
    fn describe(&self, unit: &ProcessingUnit) -> Result<String, PipelineError> {
        Ok(format!("{} {}", self.program, self.arguments(unit)?.join(" ")))
    }

    fn scratch_artifacts(&self, unit: &ProcessingUnit) -> Vec<Utf8PathBuf> {
        vec![self.sam_path(unit)]
    }

    fn run(&self, unit: &ProcessingUnit, log: &File) -> Result<JobStatus, PipelineError> {
        let stdout = log
            .try_clone()
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let stderr = log
            .try_clone()
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let status = Command::new(&self.program)
            .args(self.arguments(unit)?)
            .current_dir(self.workspace.working_dir().as_std_path())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(|err| PipelineError::MissingTool(format!("{}: {err}", self.program)))?;
        Ok(JobStatus::from(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PairTags, UnitKey};
    use crate::workspace::RRNA_SUBFOLDER;

    #[test]
    fn paired_arguments_include_both_mates() {
        let workspace = Workspace::new("/data", RRNA_SUBFOLDER);
        let job = Bowtie2Job::new(
            "bowtie2",
            Utf8PathBuf::from("/ref/rdna.fa"),
            ReadLayout::Paired(PairTags::new("r_1", "r_2")),
            AlignerSettings::default(),
            &workspace,
        );
        let unit = ProcessingUnit {
            key: UnitKey::new("A.1.B.2"),
            members: UnitMembers::Paired {
                first: Some("A.1.B.2.r_1.fq.gz".to_string()),
                second: Some("A.1.B.2.r_2.fq.gz".to_string()),
            },
        };
        let args = job.arguments(&unit).unwrap();
        let joined = args.join(" ");
        assert!(joined.starts_with("--phred33 -D 20 -R 3 -N 1 -L 20 -i S,1,0.50 -x /ref/rdna "));
        assert!(joined.contains("-S /data/rRNA_processed/ribo_aligns_A.1.B.2.sam"));
        assert!(joined.contains(
            "--un-conc-gz /data/rRNA_processed/A.1.B.2_rRNA_processed_r_%.fq.gz --np 0"
        ));
        assert!(joined.ends_with(
            "-1 /data/A.1.B.2.r_1.fq.gz -2 /data/A.1.B.2.r_2.fq.gz -X 1000 --dovetail"
        ));
    }

    #[test]
    fn single_arguments_use_unpaired_flag() {
        let workspace = Workspace::new("/data", RRNA_SUBFOLDER);
        let job = Bowtie2Job::new(
            "bowtie2",
            Utf8PathBuf::from("/ref/rdna.fa"),
            ReadLayout::Single,
            AlignerSettings::default(),
            &workspace,
        );
        let unit = ProcessingUnit {
            key: UnitKey::new("X"),
            members: UnitMembers::Single("X.fq.gz".to_string()),
        };
        let args = job.arguments(&unit).unwrap();
        assert_eq!(&args[args.len() - 2..], ["-U", "/data/X.fq.gz"]);
        assert!(!args.contains(&"--dovetail".to_string()));
        assert_eq!(
            job.scratch_artifacts(&unit),
            vec![Utf8PathBuf::from("/data/rRNA_processed/ribo_aligns_X.sam")]
        );
    }
}
