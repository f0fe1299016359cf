use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_PATH: &str = "./var/skyfleet-control-plane.db";
pub const DEFAULT_WORK_DURATION_SECS: u64 = 5;
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Values read from `control-plane.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub work_duration_secs: Option<u64>,
    pub event_buffer: Option<usize>,
    pub cors_origin: Option<String>,
}

/// Flags given on the command line; these win over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub work_duration_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub work_duration: Duration,
    pub event_buffer: usize,
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn resolve(overrides: Overrides) -> Result<Self> {
        let file = match &overrides.config {
            Some(path) => load_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => load_file(&path)?,
                _ => FileConfig::default(),
            },
        };
        Ok(Self::merge(file, overrides))
    }

    fn merge(file: FileConfig, overrides: Overrides) -> Self {
        Self {
            port: overrides.port.or(file.port).unwrap_or(DEFAULT_PORT),
            db_path: overrides
                .db_path
                .or(file.db_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            work_duration: Duration::from_secs(
                overrides
                    .work_duration_secs
                    .or(file.work_duration_secs)
                    .unwrap_or(DEFAULT_WORK_DURATION_SECS),
            ),
            event_buffer: file.event_buffer.unwrap_or(DEFAULT_EVENT_BUFFER),
            cors_origin: file.cors_origin,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("skyfleet").join("control-plane.toml"))
}

fn load_file(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}
