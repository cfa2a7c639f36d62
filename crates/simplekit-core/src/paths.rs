//! Destination path helpers: naming, write probes and temp files

use crate::error::{Result, ToolkitError};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Longest file name, in bytes, most filesystems accept
const MAX_FILENAME_LEN: usize = 255;

/// Bytes `temp_path_for` adds around the destination name: `.`, `.`, 32 hex digits, `.part`
const TEMP_NAME_OVERHEAD: usize = 1 + 1 + 32 + ".part".len();

/// Longest prefix of `text` that fits in `max` bytes without splitting a char
fn truncate_to_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Strip a suggested file name down to characters every filesystem accepts
pub fn sanitize_filename(name: &str) -> String {
    let safe: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
        .collect();
    let safe = truncate_to_bytes(&safe, MAX_FILENAME_LEN).trim();

    if safe.is_empty() || safe.chars().all(|c| c == '.') {
        "download".to_string()
    } else {
        safe.to_string()
    }
}

/// Last path segment of a URL, percent-decoded
pub fn suggested_filename(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.last().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            urlencoding::decode(&segment)
                .map(|decoded| decoded.into_owned())
                .unwrap_or(segment)
        })
        .unwrap_or_else(|| "download".to_string())
}

/// Hidden sibling file the engine streams into before the final rename
///
/// Long destination names are shortened so the temp name still fits in
/// `MAX_FILENAME_LEN` bytes; the transfer id keeps it unique.
pub fn temp_path_for(destination: &Path, id: Uuid) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let name = truncate_to_bytes(&name, MAX_FILENAME_LEN - TEMP_NAME_OVERHEAD);
    destination.with_file_name(format!(".{}.{}.part", name, id.simple()))
}

/// Create the destination's directory if needed and make sure it accepts writes
pub async fn prepare_destination(destination: &Path) -> Result<()> {
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| {
            ToolkitError::InvalidDestination(format!("{} has no parent directory", destination.display()))
        })?;

    fs::create_dir_all(parent).await.map_err(|e| {
        ToolkitError::InvalidDestination(format!("cannot create {}: {}", parent.display(), e))
    })?;

    probe_dir(parent).await.map_err(|e| {
        ToolkitError::InvalidDestination(format!("{} is not writable: {}", parent.display(), e))
    })
}

/// Best-effort check that `path` (a directory, or a file inside one) can be written
///
/// Any failure to probe counts as "not writable".
pub async fn verify_writable(path: &Path) -> bool {
    let dir = match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => path.to_path_buf(),
        _ => match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent.to_path_buf(),
            None => return false,
        },
    };

    match probe_dir(&dir).await {
        Ok(()) => true,
        Err(e) => {
            debug!("Write probe failed for {:?}: {}", dir, e);
            false
        }
    }
}

/// Create and delete a marker file in `dir`
async fn probe_dir(dir: &Path) -> io::Result<()> {
    let marker = dir.join(format!(".write_test.{}.tmp", Uuid::new_v4().simple()));
    fs::write(&marker, b"test").await?;
    fs::remove_file(&marker).await
}

/// Remove a leftover file; a missing file is fine
pub async fn discard_file(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("Removed {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", path, e),
    }
}
