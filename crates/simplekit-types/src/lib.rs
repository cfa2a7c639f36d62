//! Shared types for SimpleToolkit
//!
//! This crate contains the plain data structures shared between the
//! download core and the command-line front-end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

// ============================================================================
// Transfer Types
// ============================================================================

/// One in-flight or finished download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: Uuid,
    pub url: String,
    pub destination: PathBuf,
    /// Known once the server answers with a content-length
    pub total_bytes: Option<u64>,
    pub received_bytes: u64,
    pub status: TransferStatus,
    /// Only set when `status` is `Failed`
    pub error: Option<TransferFailure>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Transfer {
    pub fn new(url: String, destination: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            destination,
            total_bytes: None,
            received_bytes: 0,
            status: TransferStatus::Pending,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Percentage complete, only when the total size is known
    pub fn progress(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some((self.received_bytes as f64 / total as f64) * 100.0),
            None => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Final path component of the destination
    pub fn filename(&self) -> String {
        self.destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string())
    }
}

/// Lifecycle of a transfer
///
/// `Pending -> InProgress -> {Completed, Cancelled, Failed}`; terminal
/// states never transition further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Cancelled | TransferStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::InProgress => "in progress",
            TransferStatus::Completed => "completed",
            TransferStatus::Cancelled => "cancelled",
            TransferStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the transfer broke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Connection failure, stall, or non-2xx status
    Network,
    /// Could not write or rename the destination file
    Filesystem,
}

/// Human-readable reason recorded on a failed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FailureKind::Network => "network error",
            FailureKind::Filesystem => "filesystem error",
        };
        write!(f, "{}: {}", kind, self.message)
    }
}

// ============================================================================
// Preference Types
// ============================================================================

/// Validated, fully-defaulted user settings
///
/// Serialized with camelCase keys so the file stays compatible with the
/// settings documents written by earlier releases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceSet {
    /// Serialized color description (a JSON document), or unset
    pub theme_color: Option<String>,
    pub theme_mode: ThemeMode,
    pub animations_enabled: bool,
    pub auto_update_check: bool,
    pub developer_mode: bool,
    /// Selected value per named radio group
    pub radio_groups: BTreeMap<String, serde_json::Value>,
}

impl PreferenceSet {
    /// Field names as they appear in the settings file
    pub const FIELDS: [&'static str; 6] = [
        "themeColor",
        "themeMode",
        "animationsEnabled",
        "autoUpdateCheck",
        "developerMode",
        "radioGroups",
    ];

    /// Field names holding booleans
    pub const BOOL_FIELDS: [&'static str; 3] =
        ["animationsEnabled", "autoUpdateCheck", "developerMode"];

    /// Look up a single field by its file name
    pub fn field(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "themeColor" => Some(
                self.theme_color
                    .clone()
                    .map(serde_json::Value::String)
                    .unwrap_or(serde_json::Value::Null),
            ),
            "themeMode" => Some(serde_json::Value::String(self.theme_mode.as_str().to_string())),
            "animationsEnabled" => Some(serde_json::Value::Bool(self.animations_enabled)),
            "autoUpdateCheck" => Some(serde_json::Value::Bool(self.auto_update_check)),
            "developerMode" => Some(serde_json::Value::Bool(self.developer_mode)),
            "radioGroups" => Some(serde_json::Value::Object(
                self.radio_groups
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )),
            _ => None,
        }
    }
}

impl Default for PreferenceSet {
    fn default() -> Self {
        Self {
            theme_color: None,
            theme_mode: ThemeMode::System,
            animations_enabled: true,
            auto_update_check: true,
            developer_mode: false,
            radio_groups: BTreeMap::new(),
        }
    }
}

/// Theme setting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

impl ThemeMode {
    /// Parse one of `light`, `dark`, `system`; anything else is rejected
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "light" => Some(ThemeMode::Light),
            "dark" => Some(ThemeMode::Dark),
            "system" => Some(ThemeMode::System),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
            ThemeMode::System => "system",
        }
    }
}

// ============================================================================
// Catalog Types
// ============================================================================

/// An image offered by the remote listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(alias = "title")]
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub build: Option<String>,
    #[serde(alias = "downloadUrl")]
    pub url: String,
    #[serde(default)]
    pub size: Option<ImageSize>,
    #[serde(default)]
    pub release_date: Option<String>,
}

impl CatalogEntry {
    /// Name plus version, as shown in listings
    pub fn display_name(&self) -> String {
        match &self.version {
            Some(version) => format!("{} {}", self.name, version),
            None => self.name.clone(),
        }
    }

    /// File name offered to the save dialog, e.g. `macOS_Sonoma_14.5.dmg`
    pub fn suggested_filename(&self) -> String {
        let stem = self.name.split_whitespace().collect::<Vec<_>>().join("_");
        match &self.version {
            Some(version) => format!("{}_{}.dmg", stem, version),
            None => format!("{}.dmg", stem),
        }
    }
}

/// Listing sizes arrive either as raw byte counts or preformatted labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageSize {
    Bytes(u64),
    Label(String),
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSize::Bytes(bytes) => write!(f, "{} bytes", bytes),
            ImageSize::Label(label) => f.write_str(label),
        }
    }
}

// ============================================================================
// Paths
// ============================================================================

/// The user's downloads directory, falling back to the working directory
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TransferStatus::Pending.is_terminal());
        assert!(!TransferStatus::InProgress.is_terminal());
        assert!(TransferStatus::Completed.is_terminal());
        assert!(TransferStatus::Cancelled.is_terminal());
        assert!(TransferStatus::Failed.is_terminal());
    }

    #[test]
    fn test_progress_unknown_total() {
        let mut transfer = Transfer::new("http://x/a.dmg".into(), PathBuf::from("/tmp/a.dmg"));
        transfer.received_bytes = 10;
        assert_eq!(transfer.progress(), None);

        transfer.total_bytes = Some(40);
        assert_eq!(transfer.progress(), Some(25.0));
    }

    #[test]
    fn test_preferences_file_shape() {
        let value = serde_json::to_value(PreferenceSet::default()).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        for field in PreferenceSet::FIELDS {
            assert!(keys.contains(&field.to_string()), "missing {}", field);
        }
        assert_eq!(value["themeMode"], "system");
        assert_eq!(value["themeColor"], serde_json::Value::Null);
    }

    #[test]
    fn test_catalog_entry_aliases() {
        let entry: CatalogEntry = serde_json::from_str(
            r#"{"title": "macOS Sonoma", "version": "14.5", "build": "23F79",
                "downloadUrl": "https://cdn.example.com/sonoma.dmg",
                "size": "13.2 GB", "releaseDate": "2024-05-13"}"#,
        )
        .unwrap();
        assert_eq!(entry.name, "macOS Sonoma");
        assert_eq!(entry.url, "https://cdn.example.com/sonoma.dmg");
        assert_eq!(entry.size, Some(ImageSize::Label("13.2 GB".into())));
        assert_eq!(entry.suggested_filename(), "macOS_Sonoma_14.5.dmg");
    }

    #[test]
    fn test_failure_display() {
        let failure = TransferFailure {
            kind: FailureKind::Network,
            message: "HTTP 404".into(),
        };
        assert_eq!(failure.to_string(), "network error: HTTP 404");
    }
}
