//! SimpleToolkit Core - Download Engine and Preferences
//!
//! This crate provides the non-GUI parts of SimpleToolkit: concurrent
//! downloads of large disk images with cancellation and polled progress,
//! plus a self-healing preference store.

mod catalog;
mod config;
mod engine;
mod error;
mod manager;
mod paths;
mod picker;
mod preferences;
mod registry;

pub use catalog::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use manager::*;
pub use paths::{sanitize_filename, suggested_filename};
pub use picker::*;
pub use preferences::*;
pub use registry::*;

use std::sync::Arc;

/// The main SimpleToolkit instance
///
/// Holds the components a front-end needs. Nothing here is global; each
/// front-end builds its own instance and passes it where it is needed.
pub struct SimpleToolkit {
    /// Download facade
    pub downloads: Arc<DownloadManager>,
    /// User settings
    pub preferences: Arc<PreferenceStore>,
}

impl SimpleToolkit {
    /// Create a new instance from configuration and a save-location picker
    pub fn new(config: &CoreConfig, picker: Arc<dyn SavePathPicker>) -> Result<Self> {
        let downloads = DownloadManager::new(config, picker)?;
        let preferences = PreferenceStore::new(config.preferences_path.clone());

        Ok(Self {
            downloads: Arc::new(downloads),
            preferences: Arc::new(preferences),
        })
    }
}

impl Clone for SimpleToolkit {
    fn clone(&self) -> Self {
        Self {
            downloads: Arc::clone(&self.downloads),
            preferences: Arc::clone(&self.preferences),
        }
    }
}
