//! Startup checks module for the media recoder
//!
//! Provides preflight checks to verify system requirements before starting the daemon:
//! - ffprobe and ffmpeg availability
//! - Configured encoders compiled into ffmpeg
//! - Cache root exists and is a directory

use crate::config::Settings;
use std::fs;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{tool} not available: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("ffmpeg has no '{0}' encoder; rebuild ffmpeg or choose another codec")]
    EncoderMissing(String),

    #[error("Cache root {path} unusable: {reason}")]
    CacheRoot { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check that a tool runs with `-version`, returning its stdout.
pub fn check_tool_available(tool: &Path) -> Result<String, StartupError> {
    let unavailable = |reason: String| StartupError::ToolUnavailable {
        tool: tool.display().to_string(),
        reason,
    };

    let output = Command::new(tool)
        .arg("-version")
        .output()
        .map_err(|e| unavailable(format!("is it installed and in PATH? Error: {}", e)))?;

    if !output.status.success() {
        return Err(unavailable(format!(
            "-version exited with status {}",
            output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse FFmpeg version string and extract major version number
///
/// Handles various FFmpeg version formats:
/// - Standard: "ffmpeg version 7.1 ..."
/// - N-prefixed: "ffmpeg version n7.1-... ..."
pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("version"))?;

    let version_part = version_line
        .to_lowercase()
        .split("version")
        .nth(1)?
        .split_whitespace()
        .next()?
        .to_string();

    let version_str = version_part.trim_start_matches('n');

    let major_str = version_str.split(['.', '-']).next()?;

    major_str.parse().ok()
}

/// Parse the encoder names out of `ffmpeg -encoders` output.
///
/// The listing starts after the ` ------` separator; each line is
/// `<flags> <name> <description>`.
pub fn parse_encoder_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

/// Check that every required encoder is compiled into ffmpeg.
pub fn check_encoders_available(ffmpeg: &Path, required: &[&str]) -> Result<(), StartupError> {
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .output()
        .map_err(|e| StartupError::ToolUnavailable {
            tool: ffmpeg.display().to_string(),
            reason: e.to_string(),
        })?;

    let encoders = parse_encoder_list(&String::from_utf8_lossy(&output.stdout));
    for name in required {
        if !encoders.iter().any(|e| e == name) {
            return Err(StartupError::EncoderMissing(name.to_string()));
        }
    }
    Ok(())
}

/// Create the cache root if needed and confirm it is a directory.
pub fn ensure_cache_root(cache_root: &Path) -> Result<(), StartupError> {
    let cache_error = |reason: String| StartupError::CacheRoot {
        path: cache_root.display().to_string(),
        reason,
    };

    fs::create_dir_all(cache_root).map_err(|e| cache_error(e.to_string()))?;
    if !cache_root.is_dir() {
        return Err(cache_error("not a directory".to_string()));
    }
    Ok(())
}

/// Run all startup checks in order
///
/// Checks are run in the following order:
/// 1. ffprobe availability
/// 2. ffmpeg availability
/// 3. Configured video and audio encoders present in ffmpeg
/// 4. Cache root
pub fn run_startup_checks(settings: &Settings) -> Result<(), StartupError> {
    check_tool_available(&settings.ffprobe)?;
    let version = check_tool_available(&settings.ffmpeg)?;
    match parse_ffmpeg_version(&version) {
        Some(major) => tracing::info!(major, "found ffmpeg"),
        None => tracing::warn!("could not parse ffmpeg version"),
    }
    check_encoders_available(
        &settings.ffmpeg,
        &[settings.video_codec.encoder, settings.audio_codec.encoder],
    )?;
    ensure_cache_root(&settings.cache_root)?;
    Ok(())
}
