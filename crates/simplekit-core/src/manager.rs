//! Download Manager - the public facade over the registry and engine
//!
//! This is the top-level coordinator that:
//! - Validates caller input before anything is created
//! - Registers transfers and dispatches one engine task each
//! - Forwards cancellation and serves snapshots for polling
//! - Resolves destinations through the save-location collaborator

use crate::catalog::CatalogFetcher;
use crate::config::CoreConfig;
use crate::engine::{build_client, DownloadEngine};
use crate::error::{Result, ToolkitError};
use crate::paths::{sanitize_filename, verify_writable};
use crate::picker::SavePathPicker;
use crate::registry::TransferRegistry;
use parking_lot::Mutex;
use simplekit_types::{CatalogEntry, Transfer};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Download manager that coordinates all transfers
pub struct DownloadManager {
    registry: Arc<TransferRegistry>,
    engine: DownloadEngine,
    catalog: CatalogFetcher,
    picker: Arc<dyn SavePathPicker>,
    /// Destinations accepted without going through the picker
    allowed_roots: Vec<PathBuf>,
    /// Paths the user picked explicitly via `resolve_save_path`
    chosen_paths: Mutex<HashSet<PathBuf>>,
}

impl DownloadManager {
    /// Create a new download manager
    pub fn new(config: &CoreConfig, picker: Arc<dyn SavePathPicker>) -> Result<Self> {
        let client = build_client(config)?;
        let registry = Arc::new(TransferRegistry::new());
        let engine = DownloadEngine::new(client.clone(), Arc::clone(&registry), config);
        let catalog = CatalogFetcher::new(client, config.catalog_url.clone());

        Ok(Self {
            registry,
            engine,
            catalog,
            picker,
            allowed_roots: config.allowed_roots.clone(),
            chosen_paths: Mutex::new(HashSet::new()),
        })
    }

    /// Get the registry reference
    pub fn registry(&self) -> &Arc<TransferRegistry> {
        &self.registry
    }

    /// Validate, register and start a download
    ///
    /// Returns as soon as the transfer is scheduled; progress is observed by
    /// polling `list_downloads` or `get_download`.
    pub async fn start_download(&self, url: &str, destination: impl AsRef<Path>) -> Result<Uuid> {
        let destination = destination.as_ref();
        let url = validate_url(url)?;
        self.validate_destination(destination).await?;

        let transfer = self.registry.create(&url, destination).await?;
        let id = transfer.id;
        // A picked path is good for one download
        self.chosen_paths.lock().remove(destination);

        // Fire and forget: the engine records its own outcome on the transfer
        drop(self.engine.spawn(id));
        info!("Scheduled download {}: {} -> {:?}", id, url, destination);

        Ok(id)
    }

    /// Cancel a pending or running download
    ///
    /// Returns `false` for unknown ids and for transfers that already finished.
    pub fn cancel_download(&self, id: Uuid) -> bool {
        self.registry.request_cancel(id)
    }

    /// Snapshot of every download, oldest first
    pub fn list_downloads(&self) -> Vec<Transfer> {
        self.registry.list()
    }

    pub fn get_download(&self, id: Uuid) -> Result<Transfer> {
        self.registry.get(id)
    }

    /// Get count of unfinished downloads
    pub fn active_count(&self) -> usize {
        self.registry.active_count()
    }

    /// Ask the user where to save `suggested_name`
    ///
    /// `None` means the user cancelled. A returned path is remembered as
    /// explicitly chosen and accepted by `start_download` even outside the
    /// allowed roots.
    pub fn resolve_save_path(&self, suggested_name: &str) -> Option<PathBuf> {
        let safe_name = sanitize_filename(suggested_name);

        match self.picker.choose_save_location(&safe_name) {
            Some(path) => {
                info!("Save location chosen: {:?}", path);
                self.chosen_paths.lock().insert(path.clone());
                Some(path)
            }
            None => {
                info!("Save location selection cancelled for {}", safe_name);
                None
            }
        }
    }

    /// Best-effort probe; any failure reads as "not writable"
    pub async fn verify_writable(&self, path: impl AsRef<Path>) -> bool {
        verify_writable(path.as_ref()).await
    }

    /// Images offered by the remote catalog
    pub async fn available_images(&self) -> Result<Vec<CatalogEntry>> {
        self.catalog.fetch_available_images().await
    }

    async fn validate_destination(&self, destination: &Path) -> Result<()> {
        if !destination.is_absolute() {
            return Err(ToolkitError::Validation(format!(
                "destination must be an absolute path: {}",
                destination.display()
            )));
        }
        if destination.file_name().is_none()
            || destination.components().any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ToolkitError::Validation(format!(
                "destination must name a file: {}",
                destination.display()
            )));
        }
        if matches!(tokio::fs::metadata(destination).await, Ok(meta) if meta.is_dir()) {
            return Err(ToolkitError::Validation(format!(
                "destination is a directory: {}",
                destination.display()
            )));
        }

        let chosen = self.chosen_paths.lock().contains(destination);
        let under_root = self
            .allowed_roots
            .iter()
            .any(|root| destination.starts_with(root));
        if !chosen && !under_root {
            return Err(ToolkitError::Validation(format!(
                "{} is outside the download directories and was not chosen by the user",
                destination.display()
            )));
        }

        Ok(())
    }
}

/// Non-empty, parseable http(s) URL
fn validate_url(url: &str) -> Result<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ToolkitError::Validation("URL must not be empty".to_string()));
    }

    let parsed = url::Url::parse(url)
        .map_err(|e| ToolkitError::Validation(format!("invalid URL {}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(ToolkitError::Validation(format!(
            "unsupported URL scheme: {}",
            other
        ))),
    }
}
