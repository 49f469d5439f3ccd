use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub const FASTQ_GZ_SUFFIX: &str = ".fq.gz";
pub const LOST_READS_SUFFIX: &str = ".lostreads.fq.gz";
pub const MANIFEST_SUFFIX: &str = ".md5sums.txt";
pub const MERGED_TAG: &str = "merged";

const KEY_FIELDS: usize = 4;

/// Identity of one processing unit, e.g. `SLX-1234.i701_i502.HXXXXX.s_1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitKey(String);

impl UnitKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A FASTQ filename split into its unit key and role tag.
///
/// The extension is stripped before splitting, so anything after the fifth
/// field does not affect the role tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFileName {
    pub file_name: String,
    pub key: UnitKey,
    pub role: String,
}

impl FromStr for SampleFileName {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let stem = value.strip_suffix(FASTQ_GZ_SUFFIX).unwrap_or(value);
        let fields = stem.split('.').collect::<Vec<_>>();
        let (key_fields, rest) = match fields.split_at_checked(KEY_FIELDS) {
            Some(parts) => parts,
            None => return Err(PipelineError::MalformedFilename(value.to_string())),
        };
        let role = match rest.first() {
            Some(role) if !role.is_empty() => role.to_string(),
            _ => return Err(PipelineError::MalformedFilename(value.to_string())),
        };
        if key_fields.iter().any(|field| field.is_empty()) {
            return Err(PipelineError::MalformedFilename(value.to_string()));
        }
        Ok(Self {
            file_name: value.to_string(),
            key: UnitKey(key_fields.join(".")),
            role,
        })
    }
}

impl SampleFileName {
    /// Unit key for single-end grouping, where no role field is needed.
    /// Names with fewer than four fields use all the fields they have.
    pub fn key_only(value: &str) -> Result<UnitKey, PipelineError> {
        let stem = value.strip_suffix(FASTQ_GZ_SUFFIX).unwrap_or(value);
        if stem.is_empty() {
            return Err(PipelineError::MalformedFilename(value.to_string()));
        }
        let fields = stem.split('.').take(KEY_FIELDS).collect::<Vec<_>>();
        Ok(UnitKey(fields.join(".")))
    }
}

/// The two role markers of a paired-end run, in `-1`/`-2` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairTags {
    pub first: String,
    pub second: String,
}

impl PairTags {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    pub fn as_array(&self) -> [&str; 2] {
        [self.first.as_str(), self.second.as_str()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadLayout {
    Single,
    Paired(PairTags),
}

impl ReadLayout {
    pub fn from_flags(single_end: bool, paired_end: Option<Vec<String>>) -> Option<Self> {
        match (single_end, paired_end) {
            (true, None) => Some(ReadLayout::Single),
            (false, Some(tags)) if tags.len() == 2 => {
                Some(ReadLayout::Paired(PairTags::new(tags[0].clone(), tags[1].clone())))
            }
            _ => None,
        }
    }

    pub fn is_paired(&self) -> bool {
        matches!(self, ReadLayout::Paired(_))
    }
}

impl fmt::Display for ReadLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadLayout::Single => write!(f, "single end"),
            ReadLayout::Paired(tags) => {
                write!(f, "paired end ({} / {})", tags.first, tags.second)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MergeBackend {
    External,
    Native,
}

impl fmt::Display for MergeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeBackend::External => write!(f, "external"),
            MergeBackend::Native => write!(f, "native"),
        }
    }
}

/// `.fq.gz` files that take part in grouping; lost-read outputs are excluded.
pub fn is_sample_fastq(file_name: &str) -> bool {
    file_name.ends_with(FASTQ_GZ_SUFFIX) && !file_name.ends_with(LOST_READS_SUFFIX)
}
