//! Runtime configuration for the download core

use serde::{Deserialize, Serialize};
use simplekit_types::default_download_dir;
use std::path::PathBuf;
use std::time::Duration;

/// Smallest chunk written to disk between progress reports
pub const MIN_CHUNK_SIZE: usize = 64 * 1024;
/// Largest chunk written to disk between progress reports
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Remote listing of downloadable images
pub const DEFAULT_CATALOG_URL: &str = "https://stapi.simplehac.cn/dmgList";

pub const PREFERENCES_FILE: &str = "preferences.json";

/// Settings shared by the engine, the manager and the preference store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Bytes buffered per disk write; clamped to `MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE`
    pub chunk_size: usize,
    /// Limit on establishing the connection, not on the whole transfer
    pub connect_timeout_secs: u64,
    /// Longest wait for the next piece of the body before giving up
    pub stall_timeout_secs: u64,
    pub user_agent: String,
    /// Destinations under these directories are accepted without a picker
    pub allowed_roots: Vec<PathBuf>,
    pub catalog_url: String,
    pub preferences_path: PathBuf,
}

impl CoreConfig {
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs.max(1))
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout_secs: 30,
            stall_timeout_secs: 60,
            user_agent: format!("SimpleToolkit/{}", env!("CARGO_PKG_VERSION")),
            allowed_roots: vec![default_download_dir()],
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            preferences_path: default_preferences_path(),
        }
    }
}

/// `<config dir>/simplekit/preferences.json`, or the working directory when
/// no home directory can be determined
pub fn default_preferences_path() -> PathBuf {
    directories::ProjectDirs::from("cn", "SimpleHac", "simplekit")
        .map(|dirs| dirs.config_dir().join(PREFERENCES_FILE))
        .unwrap_or_else(|| PathBuf::from(PREFERENCES_FILE))
}
