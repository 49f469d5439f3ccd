use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use rnaseq_utilities::error::PipelineError;
use rnaseq_utilities::progress::MemorySink;
use rnaseq_utilities::tpm::{read_gene_ids, summarise};

fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, path)
}

fn write_inputs(dir: &Utf8PathBuf) -> Utf8PathBuf {
    let tpm = dir.join("samples.csv_tpm.txt");
    fs::write(
        &tpm,
        "geneName\tn2_a\tn2_b\tdaf2_a\n\
         WBGene1\t1.0\t3.0\t10\n\
         WBGene2\t2\tNA\t4\n",
    )
    .unwrap();
    fs::write(
        dir.join("samples.csv"),
        "samples\tread1\tread2\tcondition\n\
         n2_a\ta.fq.gz\t\tWild Type\n\
         n2_b\tb.fq.gz\t\tWild Type\n\
         daf2_a\tc.fq.gz\t\tdaf-2 (e1370)\n",
    )
    .unwrap();
    tpm
}

#[test]
fn one_table_per_condition() {
    let (_temp, dir) = temp_dir();
    let tpm = write_inputs(&dir);

    let result = summarise(&tpm, None, &MemorySink::default()).unwrap();

    assert_eq!(
        result.outputs,
        vec![
            dir.join("TPM_std_dev_daf-2-e1370.tsv"),
            dir.join("TPM_std_dev_wild-type.tsv"),
        ]
    );
    let wild = fs::read_to_string(dir.join("TPM_std_dev_wild-type.tsv")).unwrap();
    let lines = wild.lines().collect::<Vec<_>>();
    assert_eq!(
        lines[0],
        "geneName\tgene\tn2_a\tn2_b\ttpm_mean\ttpm_standard_deviation"
    );
    assert!(lines[1].starts_with("WBGene1\tWBGene1\t1.0\t3.0\t2\t1.41421356"));
    assert_eq!(lines[2], "WBGene2\tWBGene2\t2\tNA\t2\t");

    let daf = fs::read_to_string(dir.join("TPM_std_dev_daf-2-e1370.tsv")).unwrap();
    assert_eq!(daf.lines().nth(1), Some("WBGene1\tWBGene1\t10\t10\t"));
}

#[test]
fn gene_ids_restrict_and_label_rows() {
    let (_temp, dir) = temp_dir();
    let tpm = write_inputs(&dir);
    let genes = dir.join("gene_ids.csv");
    fs::write(&genes, "1,WBGene1,unc-22,T1\n2,WBGene9,,T9\n3,WBGene3,,T3\n").unwrap();

    let ids = read_gene_ids(&genes).unwrap();
    assert_eq!(ids.get("WBGene1").map(String::as_str), Some("unc-22"));
    assert_eq!(ids.get("WBGene3").map(String::as_str), Some("T3"));

    summarise(&tpm, Some(genes.as_path()), &MemorySink::default()).unwrap();
    let wild = fs::read_to_string(dir.join("TPM_std_dev_wild-type.tsv")).unwrap();
    let lines = wild.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("WBGene1\tunc-22\t"));
}

#[test]
fn missing_tpm_file_is_an_error() {
    let (_temp, dir) = temp_dir();
    let err = summarise(&dir.join("absent_tpm.txt"), None, &MemorySink::default()).unwrap_err();
    assert_matches!(err, PipelineError::Table { .. });
}
