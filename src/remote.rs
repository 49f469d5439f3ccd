use std::fs::File;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use suppaftp::FtpStream;
use suppaftp::types::FileType;

use crate::config::{Credentials, RemoteSettings};
use crate::error::PipelineError;
use crate::progress::{ProgressEvent, ProgressSink};

/// A file server that can list its files and stream one of them.
pub trait RemoteSource {
    fn list(&mut self) -> Result<Vec<String>, PipelineError>;
    fn retrieve(&mut self, name: &str, writer: &mut dyn Write) -> Result<u64, PipelineError>;
}

pub struct FtpRemote {
    settings: RemoteSettings,
    credentials: Credentials,
    stream: Option<FtpStream>,
}

impl FtpRemote {
    pub fn new(settings: RemoteSettings, credentials: Credentials) -> Self {
        Self {
            settings,
            credentials,
            stream: None,
        }
    }

    fn connection(&mut self) -> Result<&mut FtpStream, PipelineError> {
        if self.stream.is_none() {
            let address = format!("{}:{}", self.settings.host, self.settings.port);
            tracing::info!("Accessing FTP server {address}");
            let mut stream =
                FtpStream::connect(&address).map_err(|err| remote_error(&address, err))?;
            stream
                .login(&self.credentials.user, &self.credentials.password)
                .map_err(|err| remote_error(&address, err))?;
            stream
                .transfer_type(FileType::Binary)
                .map_err(|err| remote_error(&address, err))?;
            tracing::info!("Logged into FTP server");
            self.stream = Some(stream);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| PipelineError::Remote("connection unavailable".to_string()))
    }

    pub fn quit(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(err) = stream.quit() {
                tracing::warn!("FTP quit failed: {err}");
            }
        }
    }
}

impl RemoteSource for FtpRemote {
    fn list(&mut self) -> Result<Vec<String>, PipelineError> {
        let stream = self.connection()?;
        stream
            .nlst(None)
            .map_err(|err| PipelineError::Remote(format!("list: {err}")))
    }

    fn retrieve(&mut self, name: &str, writer: &mut dyn Write) -> Result<u64, PipelineError> {
        let stream = self.connection()?;
        let mut data = stream
            .retr_as_stream(name)
            .map_err(|err| PipelineError::Remote(format!("retrieve {name}: {err}")))?;
        let copied = io::copy(&mut data, writer)
            .map_err(|err| PipelineError::Remote(format!("retrieve {name}: {err}")))?;
        stream
            .finalize_retr_stream(data)
            .map_err(|err| PipelineError::Remote(format!("retrieve {name}: {err}")))?;
        Ok(copied)
    }
}

impl Drop for FtpRemote {
    fn drop(&mut self) {
        self.quit();
    }
}

fn remote_error(address: &str, err: suppaftp::FtpError) -> PipelineError {
    PipelineError::Remote(format!("{address}: {err}"))
}

/// Downloads every remote file starting with `prefix` into `dir`.
///
/// Files already present locally are kept as they are. Returns the names of
/// all matching files, downloaded now or earlier. A transfer that fails part
/// way leaves no file behind.
pub fn download_matching(
    remote: &mut dyn RemoteSource,
    prefix: &str,
    dir: &Utf8Path,
    sink: &dyn ProgressSink,
) -> Result<Vec<String>, PipelineError> {
    sink.event(ProgressEvent::info(format!(
        "Downloading files beginning with {prefix}"
    )));
    let mut names = remote
        .list()?
        .into_iter()
        .filter(|name| name.starts_with(prefix))
        .collect::<Vec<_>>();
    names.sort();

    for name in &names {
        let path = dir.join(name);
        if path.as_std_path().is_file() {
            sink.event(ProgressEvent::info(format!(
                "{name} already exists, skipping download"
            )));
            continue;
        }
        sink.event(ProgressEvent::info(format!("Downloading {name}")));
        fetch_to_path(remote, name, &path)?;
        sink.event(ProgressEvent::info(format!("File downloaded to {path}")));
    }

    Ok(names)
}

fn fetch_to_path(
    remote: &mut dyn RemoteSource,
    name: &str,
    path: &Utf8PathBuf,
) -> Result<(), PipelineError> {
    let mut file = File::create(path.as_std_path())
        .map_err(|err| PipelineError::Filesystem(format!("create {path}: {err}")))?;
    let result = remote.retrieve(name, &mut file).and_then(|_| {
        file.flush()
            .map_err(|err| PipelineError::Filesystem(format!("write {path}: {err}")))
    });
    if result.is_err() {
        drop(file);
        let _ = std::fs::remove_file(path.as_std_path());
    }
    result
}
