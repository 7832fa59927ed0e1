//! Filesystem utilities.
//!
//! Crash-tolerant write primitives for the metadata store, plus the
//! best-effort removal used to release scratch media files.
//!
//! A torn write of `db.json` would lose every clip record at once, so the
//! store never writes it in place.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::core::CoreResult;

// =============================================================================
// Identifier Validation
// =============================================================================

/// Validates that an identifier is safe to use as a store key and file stem.
///
/// Video ids double as upload file names (`<id>.webm`), so the same rules
/// that prevent path traversal apply to store keys.
pub fn validate_path_id_component(id: &str, label: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        return Err(format!("{label} is empty or contains only whitespace"));
    }
    if id != id.trim() {
        return Err(format!("Invalid {label}: leading or trailing whitespace"));
    }
    if id.contains("..") || id.contains('/') || id.contains('\\') || id.contains(':') {
        return Err(format!(
            "Invalid {label}: contains path traversal characters"
        ));
    }
    if id.chars().any(|c| c.is_control()) {
        return Err(format!("Invalid {label}: contains control characters"));
    }
    Ok(())
}

// =============================================================================
// Atomic Writes
// =============================================================================

/// Write bytes to `path` using an atomic replace pattern.
///
/// The bytes go to a sibling `.tmp` file which is synced and then renamed over
/// the destination. Readers observe either the previous content or the new
/// content, never a prefix.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = sibling_path(path, "tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    if let Err(e) = replace_file(path, &tmp_path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

/// Write a JSON file atomically with pretty formatting.
pub fn atomic_write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

/// Returns `<file_name>.<suffix>` next to `path`.
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "data".to_string());
    path.with_file_name(format!("{file_name}.{suffix}"))
}

#[cfg(not(windows))]
fn replace_file(dest: &Path, src_tmp: &Path) -> CoreResult<()> {
    // POSIX rename replaces the destination atomically.
    std::fs::rename(src_tmp, dest)?;
    Ok(())
}

#[cfg(windows)]
fn replace_file(dest: &Path, src_tmp: &Path) -> CoreResult<()> {
    if !dest.exists() {
        std::fs::rename(src_tmp, dest)?;
        return Ok(());
    }

    // rename-over-existing is not reliable here; swap through a backup.
    let bak = sibling_path(dest, "bak");
    if bak.exists() {
        let _ = std::fs::remove_file(&bak);
    }

    std::fs::rename(dest, &bak)?;
    match std::fs::rename(src_tmp, dest) {
        Ok(()) => {
            let _ = std::fs::remove_file(&bak);
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::rename(&bak, dest);
            Err(crate::core::CoreError::IoError(e))
        }
    }
}

// =============================================================================
// Removal
// =============================================================================

/// Remove a file, logging instead of failing.
///
/// Returns `true` when the file is gone afterwards (including when it never
/// existed).
pub fn remove_file_best_effort(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}

/// Move an unreadable file aside so it is not overwritten by the next save.
///
/// Returns the quarantine path on success.
pub fn quarantine_file(path: &Path) -> CoreResult<PathBuf> {
    let target = stamped_sibling(path, "corrupt");
    std::fs::rename(path, &target)?;
    Ok(target)
}

/// Copy a file to `<name>.<label>-<stamp>` before it is rewritten.
pub fn preserve_copy(path: &Path, label: &str) -> CoreResult<PathBuf> {
    let target = stamped_sibling(path, label);
    std::fs::copy(path, &target)?;
    Ok(target)
}

fn stamped_sibling(path: &Path, label: &str) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    sibling_path(path, &format!("{label}-{stamp}"))
}
