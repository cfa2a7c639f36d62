//! CLI command implementations
//!
//! Each command returns `Ok(false)` when it ran but the outcome should
//! produce a non-zero exit status.

use crate::output::{format_bytes, print_output, transfer_line};
use crate::progress;
use crate::{OutputFormat, PrefsAction};
use anyhow::{anyhow, bail, Result};
use console::style;
use serde_json::{json, Value};
use simplekit_core::{coerce_bool, suggested_filename, SimpleToolkit};
use simplekit_types::{ImageSize, PreferenceSet, TransferStatus};
use std::path::{Path, PathBuf};

// ============================================================================
// Download Commands
// ============================================================================

pub async fn download(toolkit: &SimpleToolkit, urls: &[String], format: OutputFormat) -> Result<bool> {
    let manager = &toolkit.downloads;
    let mut ok = true;

    // Ask for every location first so prompts don't interleave with bars
    let mut planned: Vec<(&str, PathBuf)> = Vec::new();
    for url in urls {
        let name = suggested_filename(url);
        match manager.resolve_save_path(&name) {
            Some(path) => planned.push((url.as_str(), path)),
            None => {
                eprintln!("{} Skipped {}", style("⊘").yellow().bold(), url);
            }
        }
    }

    let mut ids = Vec::new();
    for (url, path) in planned {
        match manager.start_download(url, &path).await {
            Ok(id) => ids.push(id),
            Err(e) => {
                ok = false;
                eprintln!("{} {}: {}", style("✗").red().bold(), url, e);
            }
        }
    }

    if ids.is_empty() {
        return Ok(ok);
    }

    let finished = progress::watch(manager, &ids).await;
    if finished
        .iter()
        .any(|t| t.status != TransferStatus::Completed)
    {
        ok = false;
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&finished)?);
        }
        OutputFormat::Human | OutputFormat::Table => {
            println!();
            for transfer in &finished {
                println!("{}", transfer_line(transfer));
            }
        }
    }

    Ok(ok)
}

// ============================================================================
// Catalog Commands
// ============================================================================

fn size_label(size: Option<&ImageSize>) -> String {
    match size {
        Some(ImageSize::Bytes(bytes)) => format_bytes(*bytes),
        Some(ImageSize::Label(label)) => label.clone(),
        None => "?".to_string(),
    }
}

pub async fn catalog(toolkit: &SimpleToolkit, format: OutputFormat) -> Result<bool> {
    let images = toolkit.downloads.available_images().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&images)?);
        }
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct ImageRow {
                name: String,
                build: String,
                size: String,
                released: String,
                url: String,
            }

            let rows: Vec<ImageRow> = images
                .iter()
                .map(|image| ImageRow {
                    name: image.display_name(),
                    build: image.build.clone().unwrap_or_default(),
                    size: size_label(image.size.as_ref()),
                    released: image.release_date.clone().unwrap_or_default(),
                    url: image.url.clone(),
                })
                .collect();

            println!("{}", Table::new(rows));
        }
        OutputFormat::Human => {
            if images.is_empty() {
                println!("{}", style("No images available").dim());
                return Ok(true);
            }

            for image in &images {
                println!(
                    "{} {}",
                    style("●").cyan(),
                    style(image.display_name()).bold()
                );
                if let Some(build) = &image.build {
                    println!("  Build: {}", build);
                }
                println!("  Size: {}", size_label(image.size.as_ref()));
                if let Some(date) = &image.release_date {
                    println!("  Released: {}", date);
                }
                println!("  {}", style(&image.url).dim());
            }
            println!();
            println!("{} image(s)", style(images.len()).bold());
        }
    }

    Ok(true)
}

// ============================================================================
// Preference Commands
// ============================================================================

/// A single `prefs set` request
struct PrefUpdate {
    field: String,
    /// Radio group name for `radioGroups.<group>` keys
    group: Option<String>,
    value: Value,
}

impl PrefUpdate {
    /// Parse `key value`
    ///
    /// Values are read as JSON when they parse, otherwise taken as plain
    /// strings. `themeColor` always keeps the raw text since it stores a
    /// serialized document.
    fn parse(key: &str, raw: &str) -> Result<Self> {
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

        if let Some(group) = key.strip_prefix("radioGroups.") {
            if group.is_empty() {
                bail!("Missing radio group name");
            }
            return Ok(Self {
                field: "radioGroups".to_string(),
                group: Some(group.to_string()),
                value,
            });
        }

        if !PreferenceSet::FIELDS.contains(&key) {
            bail!(
                "Unknown preference key: {} (expected one of {})",
                key,
                PreferenceSet::FIELDS.join(", ")
            );
        }

        let value = match (key, &value) {
            ("themeColor", Value::Null) => Value::Null,
            ("themeColor", _) => Value::String(raw.to_string()),
            _ => value,
        };

        Ok(Self {
            field: key.to_string(),
            group: None,
            value,
        })
    }

    fn document(&self) -> Value {
        match &self.group {
            Some(group) => json!({ "radioGroups": { group.as_str(): self.value.clone() } }),
            None => json!({ self.field.as_str(): self.value.clone() }),
        }
    }

    /// Current value at the addressed key
    fn current(&self, prefs: &PreferenceSet) -> Value {
        match &self.group {
            Some(group) => prefs.radio_groups.get(group).cloned().unwrap_or(Value::Null),
            None => prefs.field(&self.field).unwrap_or(Value::Null),
        }
    }

    fn display_key(&self) -> String {
        match &self.group {
            Some(group) => format!("radioGroups.{}", group),
            None => self.field.clone(),
        }
    }

    /// Whether the store kept what was asked for
    fn applied(&self, prefs: &PreferenceSet) -> bool {
        let stored = self.current(prefs);
        if PreferenceSet::BOOL_FIELDS.contains(&self.field.as_str()) {
            return coerce_bool(&self.value) == stored.as_bool();
        }
        stored == self.value
    }
}

fn print_preferences(prefs: &PreferenceSet, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(prefs)?);
        }
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct PrefRow {
                key: &'static str,
                value: String,
            }

            let rows: Vec<PrefRow> = PreferenceSet::FIELDS
                .iter()
                .map(|key| PrefRow {
                    key,
                    value: prefs.field(key).unwrap_or(Value::Null).to_string(),
                })
                .collect();

            println!("{}", Table::new(rows));
        }
        OutputFormat::Human => {
            println!("{}", style("Preferences").bold().underlined());
            for key in PreferenceSet::FIELDS {
                let value = prefs.field(key).unwrap_or(Value::Null);
                println!("  {}: {}", style(key).cyan(), value);
            }
        }
    }
    Ok(())
}

pub async fn prefs_action(
    toolkit: &SimpleToolkit,
    action: Option<PrefsAction>,
    format: OutputFormat,
) -> Result<bool> {
    let store = &toolkit.preferences;

    match action.unwrap_or(PrefsAction::Show) {
        PrefsAction::Show => {
            let prefs = store.load().await;
            print_preferences(&prefs, format)?;
        }

        PrefsAction::Get { key } => {
            let prefs = store.load().await;
            let value = match key.strip_prefix("radioGroups.") {
                Some(group) => prefs.radio_groups.get(group).cloned().unwrap_or(Value::Null),
                None => prefs
                    .field(&key)
                    .ok_or_else(|| anyhow!("Unknown preference key: {}", key))?,
            };

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&value)?),
                OutputFormat::Human | OutputFormat::Table => println!("{}", value),
            }
        }

        PrefsAction::Set { key, value } => {
            let update = PrefUpdate::parse(&key, &value)?;
            let prefs = store.save(&update.document()).await?;

            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&prefs)?);
            }

            if !update.applied(&prefs) {
                eprintln!(
                    "{} Value rejected, {} stays {}",
                    style("!").yellow().bold(),
                    style(update.display_key()).cyan(),
                    update.current(&prefs)
                );
                return Ok(false);
            }

            if format != OutputFormat::Json {
                println!(
                    "{} {} = {}",
                    style("✓").green().bold(),
                    style(update.display_key()).cyan(),
                    update.current(&prefs)
                );
            }
        }

        PrefsAction::Reset => {
            let prefs = store.reset().await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&prefs)?);
            } else {
                println!("{} Preferences reset to defaults", style("✓").green().bold());
            }
        }
    }

    Ok(true)
}

// ============================================================================
// Verify Command
// ============================================================================

#[derive(serde::Serialize)]
struct VerifyReport<'a> {
    path: &'a Path,
    writable: bool,
}

impl std::fmt::Display for VerifyReport<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.writable {
            write!(f, "{} {} is writable", style("✓").green().bold(), self.path.display())
        } else {
            write!(f, "{} {} is not writable", style("✗").red().bold(), self.path.display())
        }
    }
}

pub async fn verify(toolkit: &SimpleToolkit, path: &Path, format: OutputFormat) -> Result<bool> {
    let writable = toolkit.downloads.verify_writable(path).await;
    print_output(&VerifyReport { path, writable }, format)?;
    Ok(writable)
}
