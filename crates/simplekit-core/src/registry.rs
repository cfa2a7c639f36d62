//! Transfer registry - the single owner of every transfer record
//!
//! All reads and mutations go through one short-lived lock. Nothing here
//! awaits while the lock is held; the only async step is preparing the
//! destination directory, which happens before the lock is taken.

use crate::error::{Result, ToolkitError};
use crate::paths::prepare_destination;
use chrono::Utc;
use parking_lot::Mutex;
use simplekit_types::{Transfer, TransferFailure, TransferStatus};
use std::collections::HashMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

struct Entry {
    transfer: Transfer,
    /// Shared with the engine task, which checks it at chunk boundaries and
    /// races it against every network wait
    cancel: CancellationToken,
}

/// Concurrency-safe table of transfers keyed by id
#[derive(Default)]
pub struct TransferRegistry {
    entries: Mutex<HashMap<Uuid, Entry>>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new `Pending` transfer
    ///
    /// Fails with `InvalidDestination` if the destination directory cannot be
    /// created or written, and with `Validation` if another unfinished
    /// transfer already targets the same path.
    pub async fn create(&self, url: &str, destination: &Path) -> Result<Transfer> {
        prepare_destination(destination).await?;

        let transfer = Transfer::new(url.to_string(), destination.to_path_buf());
        let mut entries = self.entries.lock();

        let busy = entries
            .values()
            .any(|e| !e.transfer.is_terminal() && e.transfer.destination == destination);
        if busy {
            return Err(ToolkitError::Validation(format!(
                "{} is already the destination of an active download",
                destination.display()
            )));
        }

        entries.insert(
            transfer.id,
            Entry {
                transfer: transfer.clone(),
                cancel: CancellationToken::new(),
            },
        );
        info!("Registered transfer {}: {} -> {:?}", transfer.id, url, destination);

        Ok(transfer)
    }

    pub fn get(&self, id: Uuid) -> Result<Transfer> {
        self.entries
            .lock()
            .get(&id)
            .map(|e| e.transfer.clone())
            .ok_or(ToolkitError::NotFound(id))
    }

    /// Copy of every transfer, oldest first
    pub fn list(&self) -> Vec<Transfer> {
        let mut transfers: Vec<Transfer> = self
            .entries
            .lock()
            .values()
            .map(|e| e.transfer.clone())
            .collect();
        transfers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        transfers
    }

    /// Number of transfers that have not reached a terminal state
    pub fn active_count(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|e| !e.transfer.is_terminal())
            .count()
    }

    /// The cancellation token the engine watches for this transfer
    pub fn cancel_token(&self, id: Uuid) -> Option<CancellationToken> {
        self.entries.lock().get(&id).map(|e| e.cancel.clone())
    }

    /// Cancel the token of an unfinished transfer
    ///
    /// Returns `false` for unknown or already-terminal transfers.
    pub fn request_cancel(&self, id: Uuid) -> bool {
        let entries = self.entries.lock();
        match entries.get(&id) {
            Some(entry) if !entry.transfer.is_terminal() => {
                entry.cancel.cancel();
                info!("Cancellation requested for transfer {}", id);
                true
            }
            _ => false,
        }
    }

    /// Move a pending transfer to `InProgress` once the server has answered
    ///
    /// Returns `false` if the transfer is unknown or already terminal.
    pub fn mark_in_progress(&self, id: Uuid, total_bytes: Option<u64>) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&id) else {
            return false;
        };
        if entry.transfer.is_terminal() {
            return false;
        }

        entry.transfer.status = TransferStatus::InProgress;
        if total_bytes.is_some() {
            entry.transfer.total_bytes = total_bytes;
        }
        true
    }

    /// Record received bytes; ignored once the transfer is terminal
    pub fn update_progress(&self, id: Uuid, received_bytes: u64, total_bytes: Option<u64>) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&id) else {
            return;
        };
        if entry.transfer.is_terminal() {
            debug!("Dropping stale progress for finished transfer {}", id);
            return;
        }

        let transfer = &mut entry.transfer;
        transfer.received_bytes = transfer.received_bytes.max(received_bytes);
        if total_bytes.is_some() {
            transfer.total_bytes = total_bytes;
        }
        if transfer.status == TransferStatus::Pending {
            transfer.status = TransferStatus::InProgress;
        }
    }

    pub fn mark_completed(&self, id: Uuid) -> bool {
        self.finish(id, TransferStatus::Completed, None)
    }

    pub fn mark_failed(&self, id: Uuid, failure: TransferFailure) -> bool {
        self.finish(id, TransferStatus::Failed, Some(failure))
    }

    pub fn mark_cancelled(&self, id: Uuid) -> bool {
        self.finish(id, TransferStatus::Cancelled, None)
    }

    /// One-way transition into a terminal state
    ///
    /// A second call is a silent no-op since completion and cancellation may
    /// race. Returns whether this call performed the transition.
    fn finish(&self, id: Uuid, status: TransferStatus, error: Option<TransferFailure>) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&id) else {
            return false;
        };
        if entry.transfer.is_terminal() {
            debug!(
                "Transfer {} already {}, ignoring transition to {}",
                id, entry.transfer.status, status
            );
            return false;
        }

        entry.transfer.status = status;
        entry.transfer.error = error;
        entry.transfer.finished_at = Some(Utc::now());
        true
    }
}
