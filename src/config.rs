use std::fs;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::MergeBackend;
use crate::error::PipelineError;

pub const CONFIG_FILE_NAME: &str = "rnaseq-utils.json";
pub const FTP_USER_ENV: &str = "RNASEQ_FTP_USER";
pub const FTP_PASSWORD_ENV: &str = "RNASEQ_FTP_PASSWORD";

const DEFAULT_RETRY_BUDGET: u32 = 3;
const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub remote: Option<RemoteEntry>,
    #[serde(default)]
    pub retry_budget: Option<u32>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub tools: Option<ToolEntry>,
    #[serde(default)]
    pub aligner: Option<AlignerEntry>,
    #[serde(default)]
    pub merge_backend: Option<MergeBackend>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RemoteEntry {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ToolEntry {
    #[serde(default)]
    pub bowtie2: Option<String>,
    #[serde(default)]
    pub zcat: Option<String>,
    #[serde(default)]
    pub pigz: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AlignerEntry {
    #[serde(default)]
    pub max_fragment_length: Option<u32>,
    #[serde(default)]
    pub seed_extension_attempts: Option<u32>,
    #[serde(default)]
    pub reseed_rounds: Option<u32>,
    #[serde(default)]
    pub seed_mismatches: Option<u32>,
    #[serde(default)]
    pub seed_length: Option<u32>,
    #[serde(default)]
    pub seed_interval: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub bowtie2: String,
    pub zcat: String,
    pub pigz: String,
}

/// Alignment parameters held constant across every unit of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignerSettings {
    pub max_fragment_length: u32,
    pub seed_extension_attempts: u32,
    pub reseed_rounds: u32,
    pub seed_mismatches: u32,
    pub seed_length: u32,
    pub seed_interval: String,
}

impl Default for AlignerSettings {
    fn default() -> Self {
        Self {
            max_fragment_length: 1000,
            seed_extension_attempts: 20,
            reseed_rounds: 3,
            seed_mismatches: 1,
            seed_length: 20,
            seed_interval: "S,1,0.50".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub remote: RemoteSettings,
    pub retry_budget: u32,
    pub chunk_size: usize,
    pub tools: ToolPaths,
    pub aligner: AlignerSettings,
    pub merge_backend: MergeBackend,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config from `path`, else `./rnaseq-utils.json`, else the
    /// platform config directory. No file at all yields the defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PipelineError> {
        let config_path = match path {
            Some(path) => Some(Utf8PathBuf::from(path)),
            None => default_config_path(),
        };

        let config = match config_path {
            Some(config_path) => {
                let content = fs::read_to_string(config_path.as_std_path())
                    .map_err(|_| PipelineError::ConfigRead(config_path.clone()))?;
                serde_json::from_str::<Config>(&content)
                    .map_err(|err| PipelineError::ConfigParse(err.to_string()))?
            }
            None => Config::default(),
        };

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PipelineError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let retry_budget = config.retry_budget.unwrap_or(DEFAULT_RETRY_BUDGET);
        if retry_budget == 0 {
            return Err(PipelineError::ConfigParse(
                "retry_budget must be at least 1".to_string(),
            ));
        }
        let chunk_size = config.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(PipelineError::ConfigParse(
                "chunk_size must be at least 1".to_string(),
            ));
        }

        let remote = config.remote.unwrap_or_default();
        let tools = config.tools.unwrap_or_default();
        let aligner = config.aligner.unwrap_or_default();
        let aligner_defaults = AlignerSettings::default();

        Ok(ResolvedConfig {
            schema_version,
            remote: RemoteSettings {
                host: remote.host.unwrap_or_else(|| "ftp1.cruk.cam.ac.uk".to_string()),
                port: remote.port.unwrap_or(21),
            },
            retry_budget,
            chunk_size,
            tools: ToolPaths {
                bowtie2: tools.bowtie2.unwrap_or_else(|| "bowtie2".to_string()),
                zcat: tools.zcat.unwrap_or_else(|| "zcat".to_string()),
                pigz: tools.pigz.unwrap_or_else(|| "pigz".to_string()),
            },
            aligner: AlignerSettings {
                max_fragment_length: aligner
                    .max_fragment_length
                    .unwrap_or(aligner_defaults.max_fragment_length),
                seed_extension_attempts: aligner
                    .seed_extension_attempts
                    .unwrap_or(aligner_defaults.seed_extension_attempts),
                reseed_rounds: aligner
                    .reseed_rounds
                    .unwrap_or(aligner_defaults.reseed_rounds),
                seed_mismatches: aligner
                    .seed_mismatches
                    .unwrap_or(aligner_defaults.seed_mismatches),
                seed_length: aligner.seed_length.unwrap_or(aligner_defaults.seed_length),
                seed_interval: aligner
                    .seed_interval
                    .unwrap_or(aligner_defaults.seed_interval),
            },
            merge_backend: config.merge_backend.unwrap_or(MergeBackend::External),
        })
    }
}

fn default_config_path() -> Option<Utf8PathBuf> {
    let local = Utf8PathBuf::from(CONFIG_FILE_NAME);
    if local.as_std_path().exists() {
        return Some(local);
    }
    ProjectDirs::from("", "", "rnaseq-utilities")
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.config_dir().join("config.json")).ok())
        .filter(|path| path.as_std_path().exists())
}

/// FTP login taken from `RNASEQ_FTP_USER` / `RNASEQ_FTP_PASSWORD`.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self, PipelineError> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| PipelineError::MissingCredentials(name.to_string()))
        };
        Ok(Self {
            user: read(FTP_USER_ENV)?,
            password: read(FTP_PASSWORD_ENV)?,
        })
    }
}
