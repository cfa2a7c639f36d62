//! Progress bars for CLI downloads
//!
//! The core exposes snapshots only, so bars are driven by polling the
//! manager until every watched transfer reaches a terminal state.

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use simplekit_core::DownloadManager;
use simplekit_types::{Transfer, TransferStatus};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

fn sized_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░  ")
}

fn unsized_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg} {bytes} ({bytes_per_sec})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Manages progress bars for multiple downloads
pub struct DownloadProgress {
    multi: MultiProgress,
    bars: HashMap<Uuid, ProgressBar>,
}

impl DownloadProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
        }
    }

    /// Create a bar for a transfer
    pub fn add(&mut self, transfer: &Transfer) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(unsized_style());
        pb.set_message(transfer.filename());
        pb.enable_steady_tick(Duration::from_millis(120));
        self.bars.insert(transfer.id, pb);
    }

    /// Bring a bar in line with the latest snapshot
    pub fn update(&self, transfer: &Transfer) {
        let Some(pb) = self.bars.get(&transfer.id) else {
            return;
        };
        if pb.is_finished() {
            return;
        }

        if let Some(total) = transfer.total_bytes {
            if pb.length() != Some(total) {
                pb.set_style(sized_style());
                pb.set_length(total);
            }
        }
        pb.set_position(transfer.received_bytes);

        match transfer.status {
            TransferStatus::Completed => {
                pb.finish_with_message(format!(
                    "{} {}",
                    style("✓").green().bold(),
                    transfer.filename()
                ));
            }
            TransferStatus::Failed => {
                let reason = transfer
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string());
                pb.abandon_with_message(format!(
                    "{} {}: {}",
                    style("✗").red().bold(),
                    transfer.filename(),
                    reason
                ));
            }
            TransferStatus::Cancelled => {
                pb.abandon_with_message(format!(
                    "{} {} cancelled",
                    style("⊘").yellow().bold(),
                    transfer.filename()
                ));
            }
            TransferStatus::Pending | TransferStatus::InProgress => {}
        }
    }
}

/// Poll until all `ids` are terminal, cancelling everything on Ctrl-C
///
/// Returns the final snapshots in the order of `ids`.
pub async fn watch(manager: &DownloadManager, ids: &[Uuid]) -> Vec<Transfer> {
    let mut progress = DownloadProgress::new();
    for id in ids {
        if let Ok(transfer) = manager.get_download(*id) {
            progress.add(&transfer);
        }
    }

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::info!("Interrupted, cancelling {} download(s)", ids.len());
                for id in ids {
                    manager.cancel_download(*id);
                }
            }
        }

        let snapshot: Vec<Transfer> = ids
            .iter()
            .filter_map(|id| manager.get_download(*id).ok())
            .collect();
        for transfer in &snapshot {
            progress.update(transfer);
        }

        if snapshot.iter().all(Transfer::is_terminal) {
            return snapshot;
        }
    }
}
