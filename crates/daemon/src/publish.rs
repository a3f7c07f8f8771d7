//! Verifier and publisher.
//!
//! Confirms a converted file meets the target policy and moves it over the
//! original location, removing the source only after the moved file has been
//! verified again.

use crate::config::Settings;
use crate::policy::has_target_video;
use crate::probe::{probe, ProbeOutcome};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors that can occur while publishing a converted file.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Failed to move the scratch file to its destination.
    #[error("Failed to move {from} to {to}: {source}")]
    MoveFailed {
        from: String,
        to: String,
        source: io::Error,
    },

    /// The file at the destination did not pass verification after the move.
    #[error("Destination {0} failed verification after move")]
    DestinationUnverified(String),

    /// Failed to remove the original source file.
    #[error("Failed to remove original {path}: {source}")]
    RemoveSourceFailed {
        path: String,
        source: io::Error,
    },
}

/// Probes a candidate file and checks that it carries the target video codec.
pub fn verify(path: &Path, settings: &Settings) -> bool {
    match probe(&settings.ffprobe, path) {
        ProbeOutcome::Readable(result) => has_target_video(&result, settings),
        ProbeOutcome::Unreadable { reason } => {
            tracing::debug!(path = %path.display(), %reason, "verification probe unreadable");
            false
        }
    }
}

/// Moves `from` to `to`, replacing any existing file.
///
/// A plain rename when both paths share a filesystem. Across filesystems the
/// bytes are staged in a temp file next to `to` and renamed over it, so `to`
/// always holds either the old file or the complete new one.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() != io::ErrorKind::CrossesDevices => return Err(e),
        Err(_) => {}
    }

    let dir = match to.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)?;
    let mut source = File::open(from)?;
    io::copy(&mut source, staged.as_file_mut())?;
    staged.as_file().sync_all()?;
    fs::set_permissions(staged.path(), source.metadata()?.permissions())?;

    // Dropping the temp file on error removes the staged copy.
    staged.persist(to).map_err(|e| e.error)?;
    fs::remove_file(from)
}

/// Publishes a verified scratch file over the destination path.
///
/// Steps:
/// 1. Move the scratch file to `dest_path`
/// 2. Verify the file at `dest_path` again
/// 3. Remove `source_path` if it differs from `dest_path`
///
/// The source is never removed unless step 2 passes.
pub fn publish(
    scratch_path: &Path,
    dest_path: &Path,
    source_path: &Path,
    settings: &Settings,
) -> Result<(), PublishError> {
    move_file(scratch_path, dest_path).map_err(|source| PublishError::MoveFailed {
        from: scratch_path.display().to_string(),
        to: dest_path.display().to_string(),
        source,
    })?;

    if !verify(dest_path, settings) {
        return Err(PublishError::DestinationUnverified(
            dest_path.display().to_string(),
        ));
    }

    if source_path != dest_path {
        fs::remove_file(source_path).map_err(|source| PublishError::RemoveSourceFailed {
            path: source_path.display().to_string(),
            source,
        })?;
    }

    Ok(())
}
