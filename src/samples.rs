use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::FASTQ_GZ_SUFFIX;
use crate::error::PipelineError;
use crate::progress::{ProgressEvent, ProgressSink};

pub const SAMPLES_TABLE: &str = "samples.csv";

#[derive(Debug, Deserialize)]
struct SheetRow {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Index")]
    index: String,
}

/// One row of the submission sample sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleEntry {
    pub name: String,
    /// Barcode index with `-` replaced by `_`, as it appears in file names.
    pub index: String,
}

/// Reads the tab-separated export of the submission form.
pub fn read_sample_sheet(path: &Utf8Path) -> Result<Vec<SampleEntry>, PipelineError> {
    let table_error = |message: String| PipelineError::Table {
        path: path.to_path_buf(),
        message,
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .from_path(path.as_std_path())
        .map_err(|err| table_error(err.to_string()))?;

    let mut entries = Vec::new();
    for row in reader.deserialize::<SheetRow>() {
        let row = row.map_err(|err| table_error(err.to_string()))?;
        if row.index.is_empty() {
            continue;
        }
        entries.push(SampleEntry {
            name: row.name,
            index: row.index.replace('-', "_"),
        });
    }
    Ok(entries)
}

#[derive(Debug, Serialize)]
struct SamplesRow<'a> {
    samples: &'a str,
    read1: String,
    read2: String,
    condition: &'a str,
}

/// Writes `samples.csv` listing each sample's read files, ready for the
/// user to fill in the condition column.
pub fn write_samples_table(
    dir: &Utf8Path,
    prefix: &str,
    entries: &[SampleEntry],
    files: &[String],
    sink: &dyn ProgressSink,
) -> Result<Utf8PathBuf, PipelineError> {
    let output = dir.join(SAMPLES_TABLE);
    sink.event(ProgressEvent::info(format!("Writing to {output}")));
    let table_error = |message: String| PipelineError::Table {
        path: output.clone(),
        message,
    };

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(output.as_std_path())
        .map_err(|err| table_error(err.to_string()))?;

    for entry in entries {
        let reads = read_files_for(prefix, &entry.index, files)?;
        if reads.is_empty() {
            sink.event(ProgressEvent::warn(format!(
                "No read files found for sample {} (index {})",
                entry.name, entry.index
            )));
        }
        let path_of = |position: usize| {
            reads
                .get(position)
                .map(|name| dir.join(name).to_string())
                .unwrap_or_default()
        };
        writer
            .serialize(SamplesRow {
                samples: &entry.name,
                read1: path_of(0),
                read2: if reads.len() == 2 { path_of(1) } else { String::new() },
                condition: "",
            })
            .map_err(|err| table_error(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| table_error(err.to_string()))?;

    sink.event(ProgressEvent::info(format!(
        "Write complete, see {output}"
    )));
    Ok(output)
}

/// Sorted files named `<prefix>.<index>*.r_*.fq.gz`.
fn read_files_for(
    prefix: &str,
    index: &str,
    files: &[String],
) -> Result<Vec<String>, PipelineError> {
    let pattern = format!(
        r"^{}\.{}.*\.r_.*{}$",
        regex::escape(prefix),
        regex::escape(index),
        regex::escape(FASTQ_GZ_SUFFIX)
    );
    let matcher = Regex::new(&pattern).map_err(|err| PipelineError::Table {
        path: Utf8PathBuf::from(SAMPLES_TABLE),
        message: err.to_string(),
    })?;
    let mut reads = files
        .iter()
        .filter(|name| matcher.is_match(name))
        .cloned()
        .collect::<Vec<_>>();
    reads.sort();
    Ok(reads)
}
