use std::fs;

use assert_matches::assert_matches;

use rnaseq_utilities::config::{Config, ConfigLoader, RemoteEntry};
use rnaseq_utilities::domain::MergeBackend;
use rnaseq_utilities::error::PipelineError;

#[test]
fn explicit_file_overrides_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("rnaseq-utils.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "remote": { "host": "ftp.example.org" },
            "retry_budget": 5,
            "tools": { "pigz": "/opt/bin/pigz" },
            "aligner": { "max_fragment_length": 800 },
            "merge_backend": "native"
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.remote.host, "ftp.example.org");
    assert_eq!(resolved.remote.port, 21);
    assert_eq!(resolved.retry_budget, 5);
    assert_eq!(resolved.chunk_size, 4096);
    assert_eq!(resolved.tools.pigz, "/opt/bin/pigz");
    assert_eq!(resolved.tools.bowtie2, "bowtie2");
    assert_eq!(resolved.aligner.max_fragment_length, 800);
    assert_eq!(resolved.aligner.seed_interval, "S,1,0.50");
    assert_eq!(resolved.merge_backend, MergeBackend::Native);
}

#[test]
fn unreadable_and_invalid_files_are_config_errors() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(missing.to_str()),
        Err(PipelineError::ConfigRead(_))
    );

    let broken = temp.path().join("broken.json");
    fs::write(&broken, "{ \"retry_budget\": \"three\" }").unwrap();
    assert_matches!(
        ConfigLoader::resolve(broken.to_str()),
        Err(PipelineError::ConfigParse(_))
    );
}

#[test]
fn zero_retry_budget_is_rejected() {
    let config = Config {
        retry_budget: Some(0),
        remote: Some(RemoteEntry::default()),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(PipelineError::ConfigParse(message)) if message.contains("retry_budget")
    );
}
