use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::is_sample_fastq;
use crate::error::PipelineError;

pub fn check_directory(path: &Utf8Path, flag: &str) -> Result<Utf8PathBuf, PipelineError> {
    let absolute = std::path::absolute(path.as_std_path())
        .ok()
        .and_then(|abs| Utf8PathBuf::from_path_buf(abs).ok())
        .unwrap_or_else(|| path.to_path_buf());
    if absolute.as_std_path().is_dir() {
        Ok(absolute)
    } else {
        Err(PipelineError::InvalidDirectory {
            flag: flag.to_string(),
            path: path.to_path_buf(),
        })
    }
}

/// Plain file names in `dir`, sorted.
pub fn list_file_names(dir: &Utf8Path) -> Result<Vec<String>, PipelineError> {
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| PipelineError::Filesystem(format!("read {dir}: {err}")))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        if !entry.path().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Sample `.fq.gz` files in `dir`, excluding lost-read outputs.
pub fn list_fastq_files(dir: &Utf8Path) -> Result<Vec<String>, PipelineError> {
    let files = list_file_names(dir)?
        .into_iter()
        .filter(|name| is_sample_fastq(name))
        .collect::<Vec<_>>();
    if files.is_empty() {
        return Err(PipelineError::NoInputFiles(dir.to_path_buf()));
    }
    Ok(files)
}

/// Removes a file, treating an already missing file as success.
pub fn remove_if_exists(path: &Utf8Path) -> io::Result<bool> {
    match fs::remove_file(path.as_std_path()) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, path)
    }

    #[test]
    fn lists_only_sample_fastq() {
        let (_temp, dir) = temp_dir();
        for name in ["b.r_1.fq.gz", "a.r_1.fq.gz", "a.lostreads.fq.gz", "notes.txt"] {
            fs::write(dir.join(name), b"").unwrap();
        }
        fs::create_dir(dir.join("sub.fq.gz")).unwrap();
        let files = list_fastq_files(&dir).unwrap();
        assert_eq!(files, vec!["a.r_1.fq.gz", "b.r_1.fq.gz"]);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let (_temp, dir) = temp_dir();
        fs::write(dir.join("notes.txt"), b"").unwrap();
        assert_matches!(list_fastq_files(&dir), Err(PipelineError::NoInputFiles(_)));
    }

    #[test]
    fn missing_directory_is_rejected() {
        let (_temp, dir) = temp_dir();
        let err = check_directory(&dir.join("absent"), "directory").unwrap_err();
        assert_matches!(err, PipelineError::InvalidDirectory { .. });
    }

    #[test]
    fn remove_missing_file_is_ok() {
        let (_temp, dir) = temp_dir();
        assert!(!remove_if_exists(&dir.join("gone.sam")).unwrap());
    }
}
