//! Output formatting utilities

use crate::OutputFormat;
use console::style;
use serde::Serialize;
use simplekit_types::{Transfer, TransferStatus};

/// Print a serializable value as JSON, or a plain line otherwise
pub fn print_output<T: Serialize + std::fmt::Display>(
    value: &T,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Human | OutputFormat::Table => {
            println!("{}", value);
        }
    }
    Ok(())
}

/// Format bytes as human-readable
pub fn format_bytes(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

/// Styled status marker for a transfer
pub fn status_icon(status: TransferStatus) -> console::StyledObject<&'static str> {
    match status {
        TransferStatus::Completed => style("✓").green().bold(),
        TransferStatus::Failed => style("✗").red().bold(),
        TransferStatus::Cancelled => style("⊘").yellow().bold(),
        TransferStatus::InProgress => style("↓").cyan().bold(),
        TransferStatus::Pending => style("…").dim(),
    }
}

/// One-line summary of a finished transfer
pub fn transfer_line(transfer: &Transfer) -> String {
    let detail = match (&transfer.status, &transfer.error) {
        (TransferStatus::Failed, Some(failure)) => failure.to_string(),
        (TransferStatus::Completed, _) => format_bytes(transfer.received_bytes),
        _ => transfer.status.to_string(),
    };

    format!(
        "{} {} ({})",
        status_icon(transfer.status),
        style(transfer.destination.display()).cyan(),
        detail
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use simplekit_types::{FailureKind, TransferFailure};
    use std::path::PathBuf;

    #[test]
    fn test_transfer_line_shows_failure_message() {
        let mut transfer = Transfer::new(
            "https://example.com/a.dmg".into(),
            PathBuf::from("/tmp/a.dmg"),
        );
        transfer.status = TransferStatus::Failed;
        transfer.error = Some(TransferFailure {
            kind: FailureKind::Network,
            message: "HTTP 404".into(),
        });

        let line = transfer_line(&transfer);
        assert!(line.contains("/tmp/a.dmg"));
        assert!(line.contains("HTTP 404"));
    }
}
