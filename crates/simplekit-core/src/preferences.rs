//! Preference store - one JSON document holding user settings
//!
//! Loading never fails: a missing, unreadable or malformed file is replaced
//! with defaults so a bad settings file can never keep the app from starting.
//! Individual fields that fail validation fall back to their defaults.
//!
//! Only known keys are kept. Unknown keys in an update are ignored, and
//! unknown keys found in the file are dropped the next time it is written.

use crate::error::{Result, ToolkitError};
use serde_json::{Map, Value};
use simplekit_types::{PreferenceSet, ThemeMode};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Storage manager for the preference file
#[derive(Debug)]
pub struct PreferenceStore {
    path: PathBuf,
    /// Serializes load-merge-write cycles within this process
    lock: Mutex<()>,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings, repairing the file if needed
    pub async fn load(&self) -> PreferenceSet {
        let _guard = self.lock.lock().await;
        self.load_or_repair().await
    }

    /// Merge a partial update onto the stored settings and persist the result
    ///
    /// `update` must be a JSON object. Values that fail validation are dropped
    /// and the previous value is kept.
    pub async fn save(&self, update: &Value) -> Result<PreferenceSet> {
        let Value::Object(update) = update else {
            return Err(ToolkitError::Validation(
                "preference update must be a JSON object".to_string(),
            ));
        };

        let _guard = self.lock.lock().await;
        let mut prefs = self.load_or_repair().await;
        apply_update(&mut prefs, update);
        self.write_atomic(&prefs).await?;

        info!("Saved preferences to {:?}", self.path);
        Ok(prefs)
    }

    /// Overwrite the file with the default settings
    pub async fn reset(&self) -> Result<PreferenceSet> {
        let _guard = self.lock.lock().await;
        let defaults = PreferenceSet::default();
        self.write_atomic(&defaults).await?;

        info!("Reset preferences at {:?}", self.path);
        Ok(defaults)
    }

    async fn load_or_repair(&self) -> PreferenceSet {
        match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(document)) => return validate_document(&document),
                Ok(other) => warn!(
                    "Preference file {:?} is not a mapping (found {}), resetting",
                    self.path,
                    json_kind(&other)
                ),
                Err(e) => warn!("Preference file {:?} is corrupt ({}), resetting", self.path, e),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No preference file at {:?}, creating defaults", self.path);
            }
            Err(e) => warn!("Preference file {:?} is unreadable ({}), resetting", self.path, e),
        }

        self.discard_file().await;

        let defaults = PreferenceSet::default();
        if let Err(e) = self.write_atomic(&defaults).await {
            warn!("Failed to write default preferences to {:?}: {}", self.path, e);
        }
        defaults
    }

    async fn discard_file(&self) {
        match fs::remove_file(&self.path).await {
            Ok(()) => debug!("Removed corrupt preference file {:?}", self.path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove corrupt preference file {:?}: {}", self.path, e),
        }
    }

    /// Write to a sibling temp file, then rename it over the target
    async fn write_atomic(&self, prefs: &PreferenceSet) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(prefs)?;
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "preferences".to_string());
        let temp_path = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &self.path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Build a full set from a decoded document, defaulting every invalid field
fn validate_document(document: &Map<String, Value>) -> PreferenceSet {
    let defaults = PreferenceSet::default();

    let radio_groups = match document.get("radioGroups") {
        Some(Value::Object(groups)) => groups
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => defaults.radio_groups.clone(),
    };

    let flag = |key: &str, default: bool| document.get(key).and_then(coerce_bool).unwrap_or(default);

    PreferenceSet {
        theme_color: document.get("themeColor").and_then(theme_color),
        theme_mode: document
            .get("themeMode")
            .and_then(Value::as_str)
            .and_then(ThemeMode::from_name)
            .unwrap_or(defaults.theme_mode),
        animations_enabled: flag("animationsEnabled", defaults.animations_enabled),
        auto_update_check: flag("autoUpdateCheck", defaults.auto_update_check),
        developer_mode: flag("developerMode", defaults.developer_mode),
        radio_groups,
    }
}

/// Apply the valid parts of `update` onto `prefs`
fn apply_update(prefs: &mut PreferenceSet, update: &Map<String, Value>) {
    for (key, value) in update {
        match key.as_str() {
            "themeColor" => match value {
                Value::Null => prefs.theme_color = None,
                other => match theme_color(other) {
                    Some(color) => prefs.theme_color = Some(color),
                    None => warn!("Ignoring malformed themeColor {}", other),
                },
            },
            "themeMode" => match value.as_str().and_then(ThemeMode::from_name) {
                Some(mode) => prefs.theme_mode = mode,
                None => warn!("Ignoring invalid themeMode {}", value),
            },
            "animationsEnabled" | "autoUpdateCheck" | "developerMode" => match coerce_bool(value) {
                Some(flag) => set_flag(prefs, key, flag),
                None => warn!("Ignoring non-boolean value for {}: {}", key, value),
            },
            "radioGroups" => match value {
                Value::Object(groups) => {
                    for (group, selection) in groups {
                        // A null selection keeps the previous choice
                        if !selection.is_null() {
                            prefs.radio_groups.insert(group.clone(), selection.clone());
                        }
                    }
                }
                other => warn!("Ignoring radioGroups that is not a mapping: {}", other),
            },
            unknown => debug!("Ignoring unknown preference key {}", unknown),
        }
    }
}

fn set_flag(prefs: &mut PreferenceSet, key: &str, flag: bool) {
    match key {
        "animationsEnabled" => prefs.animations_enabled = flag,
        "autoUpdateCheck" => prefs.auto_update_check = flag,
        "developerMode" => prefs.developer_mode = flag,
        _ => {}
    }
}

/// A theme color is stored as a serialized JSON document
fn theme_color(value: &Value) -> Option<String> {
    let raw = value.as_str()?;
    serde_json::from_str::<Value>(raw).ok().map(|_| raw.to_string())
}

/// Strict booleans pass through; text and numbers count as true when they
/// read `true`, `1` or `t` (case-insensitive)
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => Some(is_truthy(text)),
        Value::Number(number) => Some(is_truthy(&number.to_string())),
        _ => None,
    }
}

fn is_truthy(text: &str) -> bool {
    matches!(text.to_ascii_lowercase().as_str(), "true" | "1" | "t")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
