//! File watcher background task.
//!
//! Watches the library root recursively and forwards files that were fully
//! written or moved into the tree to the daemon's path queue. Deletions and
//! every other event kind are ignored.

use crate::config::Settings;
use crate::scan::{is_media_file, scan_library};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to create file watcher: {0}")]
    Create(notify::Error),

    #[error("Failed to watch {path}: {source}")]
    Watch { path: String, source: notify::Error },
}

/// Paths an event makes ready for processing, before filtering.
///
/// Write-close yields the written file. A rename into the tree yields the
/// new name; for a paired rename the destination is the last path. Backends
/// that report renames without a direction (FSEvents, Windows) send
/// `RenameMode::Any`, so only the paths that still exist are kept.
pub fn ready_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => event
            .paths
            .iter()
            .filter(|p| p.exists())
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

/// Expands a ready path into candidate media files.
///
/// A directory moved into the tree is walked for media files. Paths inside
/// the cache root or without a recognized extension are dropped.
pub fn candidates_for(path: &Path, settings: &Settings) -> Vec<PathBuf> {
    if path.starts_with(&settings.cache_root) {
        return Vec::new();
    }
    if path.is_dir() {
        return scan_library(path, &settings.extensions, Some(&settings.cache_root));
    }
    if is_media_file(path, &settings.extensions) {
        vec![path.to_path_buf()]
    } else {
        tracing::trace!(path = %path.display(), "ignoring non-media path");
        Vec::new()
    }
}

/// Creates the notify watcher. Ready paths are sent on `events`.
fn create_watcher(
    root: &Path,
    events: mpsc::UnboundedSender<PathBuf>,
) -> Result<RecommendedWatcher, WatchError> {
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        match res {
            Ok(event) => {
                for path in ready_paths(&event) {
                    // Receiver gone means the task is shutting down.
                    let _ = events.send(path);
                }
            }
            Err(e) => tracing::warn!(error = %e, "watch error"),
        }
    })
    .map_err(WatchError::Create)?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|source| WatchError::Watch {
            path: root.display().to_string(),
            source,
        })?;

    Ok(watcher)
}

/// Runs the watcher until `cancel` fires.
///
/// Blocks on event arrival; every candidate is handed to `submit`.
pub async fn run_watcher<F, Fut>(
    settings: Arc<Settings>,
    cancel: CancellationToken,
    submit: F,
) -> Result<(), WatchError>
where
    F: Fn(PathBuf) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
    let watcher = create_watcher(&settings.library_root, tx)?;
    tracing::info!(root = %settings.library_root.display(), "watching library");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => {
                let Some(path) = received else { break };
                for candidate in candidates_for(&path, &settings) {
                    tracing::debug!(path = %candidate.display(), "watch event");
                    submit(candidate).await;
                }
            }
        }
    }

    drop(watcher);
    tracing::info!("file watcher stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::test_support::settings;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    #[test]
    fn test_close_write_is_ready() {
        let ev = event(
            EventKind::Access(AccessKind::Close(AccessMode::Write)),
            &["/media/a.mkv"],
        );
        assert_eq!(ready_paths(&ev), vec![PathBuf::from("/media/a.mkv")]);
    }

    #[test]
    fn test_moved_into_tree_is_ready() {
        let to = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/media/b.mkv"],
        );
        assert_eq!(ready_paths(&to), vec![PathBuf::from("/media/b.mkv")]);

        let both = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/media/old.mkv", "/media/new.mkv"],
        );
        assert_eq!(ready_paths(&both), vec![PathBuf::from("/media/new.mkv")]);
    }

    #[test]
    fn test_undirected_rename_keeps_existing_paths() {
        let temp_dir = TempDir::new().unwrap();
        let arrived = temp_dir.path().join("new.mkv");
        let departed = temp_dir.path().join("old.mkv");
        File::create(&arrived).unwrap();

        let mut ev = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any)));
        ev = ev.add_path(departed).add_path(arrived.clone());
        assert_eq!(ready_paths(&ev), vec![arrived]);
    }

    #[test]
    fn test_other_events_ignored() {
        for kind in [
            EventKind::Remove(RemoveKind::File),
            EventKind::Create(CreateKind::File),
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            EventKind::Access(AccessKind::Close(AccessMode::Read)),
        ] {
            assert!(ready_paths(&event(kind, &["/media/a.mkv"])).is_empty());
        }
    }

    #[test]
    fn test_candidates_filter_extension_and_cache() {
        let temp_dir = TempDir::new().unwrap();
        let mut cfg = settings();
        cfg.library_root = temp_dir.path().to_path_buf();
        cfg.cache_root = temp_dir.path().join(".cache");

        let movie = temp_dir.path().join("movie.mkv");
        let nfo = temp_dir.path().join("movie.nfo");
        File::create(&movie).unwrap();
        File::create(&nfo).unwrap();

        assert_eq!(candidates_for(&movie, &cfg), vec![movie.clone()]);
        assert!(candidates_for(&nfo, &cfg).is_empty());
        assert!(candidates_for(&cfg.cache_root.join("movie.mkv"), &cfg).is_empty());
    }

    #[test]
    fn test_moved_directory_is_walked() {
        let temp_dir = TempDir::new().unwrap();
        let mut cfg = settings();
        cfg.library_root = temp_dir.path().to_path_buf();
        cfg.cache_root = temp_dir.path().join(".cache");

        let season = temp_dir.path().join("Season 1");
        fs::create_dir_all(&season).unwrap();
        File::create(season.join("e02.mp4")).unwrap();
        File::create(season.join("e01.avi")).unwrap();
        File::create(season.join("notes.txt")).unwrap();

        assert_eq!(
            candidates_for(&season, &cfg),
            vec![season.join("e01.avi"), season.join("e02.mp4")]
        );
    }
}
