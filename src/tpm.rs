//! Per-condition TPM summaries: replicate values with their mean and sample
//! standard deviation, one table per experimental condition.

use std::collections::{BTreeMap, HashMap};

use camino::{Utf8Path, Utf8PathBuf};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

use crate::error::PipelineError;
use crate::progress::{ProgressEvent, ProgressSink};

pub const GENE_NAME_COLUMN: &str = "geneName";
const TPM_SUFFIX: &str = "_tpm.txt";

#[derive(Debug, Clone, PartialEq)]
pub struct TpmRow {
    pub gene_name: String,
    /// Raw cell text, one entry per sample column.
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TpmTable {
    pub samples: Vec<String>,
    pub rows: Vec<TpmRow>,
}

impl TpmTable {
    fn column(&self, sample: &str) -> Option<usize> {
        self.samples.iter().position(|name| name == sample)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TpmResult {
    pub outputs: Vec<Utf8PathBuf>,
}

fn table_error(path: &Utf8Path, message: impl ToString) -> PipelineError {
    PipelineError::Table {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// The sample table sits next to the TPM file, named without `_tpm.txt`.
pub fn samples_table_for(tpm_path: &Utf8Path) -> Utf8PathBuf {
    let name = tpm_path.file_name().unwrap_or_default();
    let stripped = name.replace(TPM_SUFFIX, "");
    match tpm_path.parent() {
        Some(parent) => parent.join(stripped),
        None => Utf8PathBuf::from(stripped),
    }
}

pub fn read_tpm_table(path: &Utf8Path) -> Result<TpmTable, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_std_path())
        .map_err(|err| table_error(path, err))?;
    let headers = reader.headers().map_err(|err| table_error(path, err))?.clone();
    let gene_column = headers
        .iter()
        .position(|header| header == GENE_NAME_COLUMN)
        .ok_or_else(|| table_error(path, format!("missing {GENE_NAME_COLUMN} column")))?;
    let samples = headers
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != gene_column)
        .map(|(_, header)| header.to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| table_error(path, err))?;
        rows.push(TpmRow {
            gene_name: record.get(gene_column).unwrap_or_default().to_string(),
            values: record
                .iter()
                .enumerate()
                .filter(|(index, _)| *index != gene_column)
                .map(|(_, value)| value.to_string())
                .collect(),
        });
    }
    Ok(TpmTable { samples, rows })
}

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s-]").unwrap();
    static ref SEPARATORS: Regex = Regex::new(r"[-\s]+").unwrap();
}

/// Lower-case ASCII slug: accents folded away (NFKD), word characters kept,
/// whitespace and hyphen runs collapsed into a single `-`.
pub fn slugify(value: &str) -> String {
    let ascii = value.nfkd().filter(char::is_ascii).collect::<String>();
    let cleaned = NON_WORD.replace_all(&ascii, "").trim().to_lowercase();
    SEPARATORS.replace_all(&cleaned, "-").into_owned()
}

/// Condition slug → sample names, read from the `samples` and `condition`
/// columns of the sample table.
pub fn read_conditions(path: &Utf8Path) -> Result<BTreeMap<String, Vec<String>>, PipelineError> {
    #[derive(serde::Deserialize)]
    struct Row {
        samples: String,
        condition: String,
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_std_path())
        .map_err(|err| table_error(path, err))?;
    let mut conditions = BTreeMap::<String, Vec<String>>::new();
    for row in reader.deserialize::<Row>() {
        let row = row.map_err(|err| table_error(path, err))?;
        conditions
            .entry(slugify(&row.condition))
            .or_default()
            .push(row.samples);
    }
    Ok(conditions)
}

/// Gene name → readable gene abbreviation from a headerless
/// `<x>,<geneName>,<gene>,<transcript_id>,...` file. A missing abbreviation
/// falls back to the transcript id.
pub fn read_gene_ids(path: &Utf8Path) -> Result<HashMap<String, String>, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path.as_std_path())
        .map_err(|err| table_error(path, err))?;
    let mut genes = HashMap::new();
    for record in reader.records() {
        let record = record.map_err(|err| table_error(path, err))?;
        let Some(gene_name) = record.get(1).filter(|name| !name.is_empty()) else {
            continue;
        };
        let gene = record
            .get(2)
            .filter(|gene| !gene.is_empty())
            .or_else(|| record.get(3))
            .unwrap_or_default();
        genes.insert(gene_name.to_string(), gene.to_string());
    }
    Ok(genes)
}

/// Mean and sample standard deviation (n - 1) of the numeric values.
/// Cells that are not numbers are ignored.
pub fn mean_and_sd(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    if values.len() < 2 {
        return (Some(mean), None);
    }
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (count - 1.0);
    (Some(mean), Some(variance.sqrt()))
}

fn format_stat(value: Option<f64>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

/// Writes `TPM_std_dev_<condition>.tsv` into `dir` for every condition.
pub fn write_condition_tables(
    dir: &Utf8Path,
    table: &TpmTable,
    conditions: &BTreeMap<String, Vec<String>>,
    gene_ids: Option<&HashMap<String, String>>,
    sink: &dyn ProgressSink,
) -> Result<Vec<Utf8PathBuf>, PipelineError> {
    sink.event(ProgressEvent::info(format!(
        "Creating {} files, one for each condition: {}",
        conditions.len(),
        conditions.keys().cloned().collect::<Vec<_>>().join(", ")
    )));

    let mut outputs = Vec::new();
    for (condition, samples) in conditions {
        let mut columns = Vec::new();
        for sample in samples {
            match table.column(sample) {
                Some(column) => columns.push((sample.as_str(), column)),
                None => sink.event(ProgressEvent::warn(format!(
                    "Sample {sample} of condition {condition} has no TPM column"
                ))),
            }
        }

        let path = dir.join(format!("TPM_std_dev_{condition}.tsv"));
        sink.event(ProgressEvent::info(format!(
            "Creating output file for condition {condition} as {path}"
        )));
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path.as_std_path())
            .map_err(|err| table_error(&path, err))?;

        let mut header = vec![GENE_NAME_COLUMN, "gene"];
        header.extend(columns.iter().map(|(sample, _)| *sample));
        header.extend(["tpm_mean", "tpm_standard_deviation"]);
        writer
            .write_record(&header)
            .map_err(|err| table_error(&path, err))?;

        for row in &table.rows {
            let gene = match gene_ids {
                Some(gene_ids) => match gene_ids.get(&row.gene_name) {
                    Some(gene) => gene.as_str(),
                    None => continue,
                },
                None => row.gene_name.as_str(),
            };
            let cells = columns
                .iter()
                .map(|(_, column)| row.values.get(*column).map(String::as_str).unwrap_or(""))
                .collect::<Vec<_>>();
            let numbers = cells
                .iter()
                .filter_map(|cell| cell.trim().parse::<f64>().ok())
                .filter(|value| !value.is_nan())
                .collect::<Vec<_>>();
            let (mean, sd) = mean_and_sd(&numbers);

            let mut record = vec![row.gene_name.clone(), gene.to_string()];
            record.extend(cells.iter().map(|cell| cell.to_string()));
            record.push(format_stat(mean));
            record.push(format_stat(sd));
            writer
                .write_record(&record)
                .map_err(|err| table_error(&path, err))?;
        }
        writer.flush().map_err(|err| table_error(&path, err))?;
        outputs.push(path);
    }
    Ok(outputs)
}

/// Runs the whole TPM summary for `tpm_path`, writing next to it.
pub fn summarise(
    tpm_path: &Utf8Path,
    gene_ids_path: Option<&Utf8Path>,
    sink: &dyn ProgressSink,
) -> Result<TpmResult, PipelineError> {
    if !tpm_path.as_std_path().is_file() {
        return Err(table_error(tpm_path, "file not found"));
    }
    let dir = tpm_path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));

    let table = read_tpm_table(tpm_path)?;
    sink.event(ProgressEvent::info("TPM file read in"));

    let samples_path = samples_table_for(tpm_path);
    let conditions = read_conditions(&samples_path)?;
    sink.event(ProgressEvent::info("Sample names and conditions read in"));

    let gene_ids = match gene_ids_path {
        Some(path) => {
            sink.event(ProgressEvent::info(format!("Reading in gene ids from {path}")));
            Some(read_gene_ids(path)?)
        }
        None => None,
    };

    let outputs = write_condition_tables(dir, &table, &conditions, gene_ids.as_ref(), sink)?;
    Ok(TpmResult { outputs })
}
