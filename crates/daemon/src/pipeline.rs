//! Per-file pipeline.
//!
//! Sequences probe, policy, synthesis, encode, verification and publish for a
//! single file. Every failure ends the file's run in a terminal [`FileState`];
//! nothing is retried and the original is never removed unless the published
//! file verified.

use crate::config::Settings;
use crate::encode::{execute, synthesize};
use crate::policy::{build_plan, needs_processing};
use crate::probe::{probe, ProbeOutcome, ProbeResult};
use crate::publish::{publish, verify};
use crate::scan::{destination_path, scratch_path};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Instrument as _;
use uuid::Uuid;

/// Why a file was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The prober could not read the file.
    Unreadable(String),
    /// Already compliant, or nothing actionable (no video stream).
    Compliant,
    /// The path no longer exists as a regular file.
    Missing,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Unreadable(reason) => write!(f, "unreadable: {}", reason),
            SkipReason::Compliant => write!(f, "compliant"),
            SkipReason::Missing => write!(f, "missing"),
        }
    }
}

/// State of a file in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    /// Waiting to be processed
    Pending,
    /// Probed and judged by the policy
    Evaluated,
    /// No work needed
    Skipped(SkipReason),
    /// Encoder running
    Converting,
    /// Encoder failed to spawn or exited non-zero
    Failed(String),
    /// Encoder finished
    Converted,
    /// Scratch output passed verification
    Verified,
    /// Scratch output did not meet the target policy
    VerifyFailed(String),
    /// Output moved over the original
    Published(PathBuf),
    /// Move, post-move verification or source removal failed
    PublishFailed(String),
}

impl FileState {
    /// Convert state to string for logs
    pub fn as_str(&self) -> &str {
        match self {
            FileState::Pending => "pending",
            FileState::Evaluated => "evaluated",
            FileState::Skipped(_) => "skipped",
            FileState::Converting => "converting",
            FileState::Failed(_) => "failed",
            FileState::Converted => "converted",
            FileState::Verified => "verified",
            FileState::VerifyFailed(_) => "verify_failed",
            FileState::Published(_) => "published",
            FileState::PublishFailed(_) => "publish_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileState::Skipped(_)
                | FileState::Failed(_)
                | FileState::VerifyFailed(_)
                | FileState::Published(_)
                | FileState::PublishFailed(_)
        )
    }
}

fn transition(path: &Path, state: FileState) {
    tracing::trace!(path = %path.display(), state = state.as_str(), "state");
}

fn evaluate(path: &Path, settings: &Settings) -> Result<ProbeResult, FileState> {
    if !path.is_file() {
        return Err(FileState::Skipped(SkipReason::Missing));
    }

    let outcome = probe(&settings.ffprobe, path);
    transition(path, FileState::Evaluated);

    let needed = needs_processing(&outcome, settings);
    match outcome {
        ProbeOutcome::Unreadable { reason } => {
            Err(FileState::Skipped(SkipReason::Unreadable(reason)))
        }
        ProbeOutcome::Readable(_) if !needed => Err(FileState::Skipped(SkipReason::Compliant)),
        ProbeOutcome::Readable(result) => Ok(result),
    }
}

fn run(path: &Path, settings: &Settings) -> FileState {
    transition(path, FileState::Pending);

    let result = match evaluate(path, settings) {
        Ok(result) => result,
        Err(state) => return state,
    };

    let plan = build_plan(&result, settings);
    let scratch = scratch_path(&settings.cache_root, path, &settings.output_container);
    let dest = destination_path(path, &settings.output_container);
    if dest != path && dest.exists() {
        return FileState::Failed(format!(
            "destination {} already exists and is a different file",
            dest.display()
        ));
    }
    let spec = synthesize(path, &scratch, &plan, settings);

    if let Err(e) = fs::create_dir_all(&settings.cache_root) {
        return FileState::Failed(format!(
            "cannot create cache root {}: {}",
            settings.cache_root.display(),
            e
        ));
    }

    transition(path, FileState::Converting);
    tracing::info!(
        path = %path.display(),
        scratch = %scratch.display(),
        args = ?spec.arg_strings(),
        "converting"
    );
    if !execute(&spec) {
        return FileState::Failed(format!("encoder failed for {}", path.display()));
    }
    transition(path, FileState::Converted);

    if !verify(&scratch, settings) {
        return FileState::VerifyFailed(format!(
            "{} does not contain a {} video stream",
            scratch.display(),
            settings.video_codec.name
        ));
    }
    transition(path, FileState::Verified);

    match publish(&scratch, &dest, path, settings) {
        Ok(()) => FileState::Published(dest),
        Err(e) => FileState::PublishFailed(e.to_string()),
    }
}

fn report(path: &Path, state: &FileState) {
    match state {
        FileState::Skipped(SkipReason::Unreadable(reason)) => {
            tracing::info!(path = %path.display(), %reason, "skipped unreadable file")
        }
        FileState::Skipped(reason) => {
            tracing::debug!(path = %path.display(), %reason, "skipped")
        }
        FileState::Failed(msg) | FileState::VerifyFailed(msg) => {
            tracing::warn!(path = %path.display(), state = state.as_str(), "{}", msg)
        }
        FileState::PublishFailed(msg) => tracing::error!(
            path = %path.display(),
            "publish failed, original may need manual recovery: {}",
            msg
        ),
        FileState::Published(dest) => {
            tracing::info!(path = %path.display(), dest = %dest.display(), "published")
        }
        _ => {}
    }
}

/// Runs one file through the whole pipeline and returns its terminal state.
///
/// Blocking: spawns ffprobe/ffmpeg and waits for them. Call from
/// `spawn_blocking` inside async code.
pub fn process_file(path: &Path, settings: &Settings) -> FileState {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("process_file", %run_id, path = %path.display());
    let _entered = span.enter();

    let state = run(path, settings);
    report(path, &state);
    state
}

/// Async wrapper that runs [`process_file`] on the blocking pool.
pub async fn process_file_async(path: PathBuf, settings: std::sync::Arc<Settings>) -> FileState {
    let span = tracing::debug_span!("dispatch", path = %path.display());
    let shown = path.display().to_string();
    let result = tokio::task::spawn_blocking(move || process_file(&path, &settings))
        .instrument(span)
        .await;

    match result {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(path = %shown, error = %e, "pipeline task panicked");
            FileState::Failed(format!("pipeline task failed: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::test_support::settings;
    use tempfile::TempDir;

    #[test]
    fn test_state_strings() {
        assert_eq!(FileState::Pending.as_str(), "pending");
        assert_eq!(FileState::VerifyFailed(String::new()).as_str(), "verify_failed");
        assert_eq!(
            FileState::Published(PathBuf::from("/m.mkv")).as_str(),
            "published"
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!FileState::Pending.is_terminal());
        assert!(!FileState::Converting.is_terminal());
        assert!(!FileState::Verified.is_terminal());
        assert!(FileState::Skipped(SkipReason::Compliant).is_terminal());
        assert!(FileState::Failed(String::new()).is_terminal());
        assert!(FileState::PublishFailed(String::new()).is_terminal());
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let state = process_file(Path::new("/nonexistent/movie.mkv"), &settings());
        assert_eq!(state, FileState::Skipped(SkipReason::Missing));
    }

    #[test]
    fn test_unprobeable_file_is_skipped_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("movie.avi");
        fs::write(&source, b"not really a movie").unwrap();

        let mut cfg = settings();
        cfg.ffprobe = "/nonexistent/bin/ffprobe".into();
        cfg.ffmpeg = "/nonexistent/bin/ffmpeg".into();
        cfg.cache_root = temp_dir.path().join("cache");

        let state = process_file(&source, &cfg);
        assert!(matches!(state, FileState::Skipped(SkipReason::Unreadable(_))));
        assert_eq!(fs::read(&source).unwrap(), b"not really a movie");
        assert!(!cfg.cache_root.exists());
    }

    #[tokio::test]
    async fn test_async_wrapper_returns_state() {
        let state = process_file_async(
            PathBuf::from("/nonexistent/movie.mkv"),
            std::sync::Arc::new(settings()),
        )
        .await;
        assert_eq!(state, FileState::Skipped(SkipReason::Missing));
    }
}
