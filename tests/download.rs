use std::collections::BTreeMap;
use std::fs;
use std::io::Write;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use rnaseq_utilities::app::{App, DownloadRequest};
use rnaseq_utilities::config::{Config, ConfigLoader};
use rnaseq_utilities::download::{DownloadOptions, DownloadSession};
use rnaseq_utilities::error::PipelineError;
use rnaseq_utilities::progress::MemorySink;
use rnaseq_utilities::remote::{RemoteSource, download_matching};

const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

/// Serves files from memory; `corrupt_serves` bad copies of `reads.fq.gz`
/// are handed out before the good one.
struct MockRemote {
    files: BTreeMap<String, Vec<u8>>,
    corrupt_serves: u32,
    lists: u32,
    retrieved: Vec<String>,
}

impl MockRemote {
    fn new(corrupt_serves: u32) -> Self {
        let mut files = BTreeMap::new();
        files.insert("SLX-9.reads.fq.gz".to_string(), b"hello".to_vec());
        files.insert(
            "SLX-9.md5sums.txt".to_string(),
            format!("{HELLO_MD5}  SLX-9.reads.fq.gz\n").into_bytes(),
        );
        files.insert("SLX-8.other.fq.gz".to_string(), b"other".to_vec());
        Self {
            files,
            corrupt_serves,
            lists: 0,
            retrieved: Vec::new(),
        }
    }

    fn with_file(mut self, name: &str, content: &[u8]) -> Self {
        self.files.insert(name.to_string(), content.to_vec());
        self
    }
}

impl RemoteSource for MockRemote {
    fn list(&mut self) -> Result<Vec<String>, PipelineError> {
        self.lists += 1;
        Ok(self.files.keys().cloned().collect())
    }

    fn retrieve(&mut self, name: &str, writer: &mut dyn Write) -> Result<u64, PipelineError> {
        self.retrieved.push(name.to_string());
        let mut content = self
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::Remote(format!("no such file {name}")))?;
        if name.ends_with(".fq.gz") && self.corrupt_serves > 0 {
            self.corrupt_serves -= 1;
            content = b"hel".to_vec();
        }
        writer
            .write_all(&content)
            .map_err(|err| PipelineError::Remote(err.to_string()))?;
        Ok(content.len() as u64)
    }
}

fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, path)
}

fn options() -> DownloadOptions {
    DownloadOptions {
        prefix: "SLX-9".to_string(),
        retry_budget: 3,
        chunk_size: 4096,
    }
}

#[test]
fn existing_files_are_not_fetched_again() {
    let (_temp, dir) = temp_dir();
    fs::write(dir.join("SLX-9.reads.fq.gz"), b"hello").unwrap();
    let mut remote = MockRemote::new(0);

    let files = download_matching(&mut remote, "SLX-9", &dir, &MemorySink::default()).unwrap();

    assert_eq!(files, vec!["SLX-9.md5sums.txt", "SLX-9.reads.fq.gz"]);
    assert_eq!(remote.retrieved, vec!["SLX-9.md5sums.txt"]);
    assert!(!dir.join("SLX-8.other.fq.gz").as_std_path().exists());
}

#[test]
fn clean_download_verifies_first_time() {
    let (_temp, dir) = temp_dir();
    let mut remote = MockRemote::new(0);

    let result = DownloadSession::new(&dir, options())
        .run(&mut remote, &MemorySink::default())
        .unwrap();

    assert_eq!(result.attempts, 1);
    assert_eq!(result.verification.passed, vec!["SLX-9.reads.fq.gz"]);
    assert_eq!(fs::read(dir.join("SLX-9.reads.fq.gz")).unwrap(), b"hello");
}

#[test]
fn corrupt_file_is_fetched_again_on_the_next_attempt() {
    let (_temp, dir) = temp_dir();
    let mut remote = MockRemote::new(1);

    let result = DownloadSession::new(&dir, options())
        .run(&mut remote, &MemorySink::default())
        .unwrap();

    assert_eq!(result.attempts, 2);
    assert_eq!(remote.lists, 2);
    assert_eq!(
        remote.retrieved,
        vec!["SLX-9.md5sums.txt", "SLX-9.reads.fq.gz", "SLX-9.reads.fq.gz"]
    );
}

#[test]
fn retry_budget_is_fatal_after_three_attempts() {
    let (_temp, dir) = temp_dir();
    let mut remote = MockRemote::new(u32::MAX);

    let err = DownloadSession::new(&dir, options())
        .run(&mut remote, &MemorySink::default())
        .unwrap_err();

    assert_matches!(err, PipelineError::RetryBudgetExhausted { attempts: 3 });
    assert_eq!(remote.lists, 3);
    assert!(!dir.join("SLX-9.reads.fq.gz").as_std_path().exists());
}

#[test]
fn sample_sheet_produces_samples_table() {
    let (_temp, dir) = temp_dir();
    let sheet = dir.join("sheet.tsv");
    fs::write(&sheet, "Name\tIndex\nworm_a\ti7-i5\nworm_b\ti8-i5\n").unwrap();
    let mut remote = MockRemote::new(0)
        .with_file("SLX-9.i7_i5.H1.s_1.r_1.fq.gz", b"one")
        .with_file("SLX-9.i7_i5.H1.s_1.r_2.fq.gz", b"two");
    let app = App::new(ConfigLoader::resolve_config(Config::default()).unwrap());
    let sink = MemorySink::default();

    let result = app
        .download(
            DownloadRequest {
                directory: dir.clone(),
                prefix: "SLX-9".to_string(),
                sample_sheet: Some(sheet),
            },
            &mut remote,
            &sink,
        )
        .unwrap();

    let table = result.samples_table.unwrap();
    assert_eq!(table, dir.join("samples.csv"));
    let content = fs::read_to_string(&table).unwrap();
    let lines = content.lines().collect::<Vec<_>>();
    assert_eq!(lines[0], "samples\tread1\tread2\tcondition");
    assert_eq!(
        lines[1],
        format!(
            "worm_a\t{}\t{}\t",
            dir.join("SLX-9.i7_i5.H1.s_1.r_1.fq.gz"),
            dir.join("SLX-9.i7_i5.H1.s_1.r_2.fq.gz")
        )
    );
    assert_eq!(lines[2], "worm_b\t\t\t");
    assert_eq!(sink.warnings().len(), 1);
}
