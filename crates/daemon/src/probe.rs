//! Media prober.
//!
//! Runs ffprobe on a file and parses its JSON report into strict
//! [`StreamDescriptor`] / [`ProbeResult`] shapes. Any failure along the way
//! (spawn, exit status, malformed JSON, missing fields) yields
//! [`ProbeOutcome::Unreadable`] rather than an error for the caller to handle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe command exited unsuccessfully.
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    /// Failed to parse ffprobe JSON output.
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    /// A field the pipeline depends on was absent.
    #[error("Missing field in ffprobe output: {0}")]
    MissingField(String),

    /// ffprobe could not be spawned.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kind of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

impl StreamKind {
    fn from_codec_type(codec_type: &str) -> Self {
        match codec_type {
            "video" => StreamKind::Video,
            "audio" => StreamKind::Audio,
            "subtitle" => StreamKind::Subtitle,
            _ => StreamKind::Other,
        }
    }

    /// Stream specifier letter used by ffmpeg (`v`, `a`, `s`).
    pub fn specifier(&self) -> Option<char> {
        match self {
            StreamKind::Video => Some('v'),
            StreamKind::Audio => Some('a'),
            StreamKind::Subtitle => Some('s'),
            StreamKind::Other => None,
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
            StreamKind::Subtitle => write!(f, "subtitle"),
            StreamKind::Other => write!(f, "other"),
        }
    }
}

/// One stream in a probed file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamDescriptor {
    /// Position in the source container.
    pub index: u32,
    pub kind: StreamKind,
    /// Codec name (e.g., "hevc", "h264", "aac"). Empty for `Other` streams
    /// that carry none.
    pub codec_name: String,
    /// Channel count, audio streams only.
    pub channel_count: Option<u32>,
    /// Stream tags (title, language, ...).
    pub tags: BTreeMap<String, String>,
}

impl StreamDescriptor {
    /// Title tag, matched case-insensitively since muxers disagree on case.
    pub fn title(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("title"))
            .map(|(_, v)| v.as_str())
    }
}

/// Container-level information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatInfo {
    /// ffprobe `format_name` (e.g., "matroska,webm").
    pub format_name: String,
    /// Duration in seconds, when the container reports one.
    pub duration_secs: Option<f64>,
}

/// Result of probing a media file. Streams are in source order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub streams: Vec<StreamDescriptor>,
    pub format: FormatInfo,
}

impl ProbeResult {
    /// Iterates over the video streams.
    pub fn video_streams(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams.iter().filter(|s| s.kind == StreamKind::Video)
    }
}

/// Outcome of a probe as seen by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Readable(ProbeResult),
    /// The file could not be inspected. Distinct from a file with zero streams.
    Unreadable { reason: String },
}

impl ProbeOutcome {
    pub fn readable(&self) -> Option<&ProbeResult> {
        match self {
            ProbeOutcome::Readable(result) => Some(result),
            ProbeOutcome::Unreadable { .. } => None,
        }
    }
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub index: Option<u32>,
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
        pub channels: Option<u32>,
        #[serde(default)]
        pub tags: BTreeMap<String, serde_json::Value>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub format_name: Option<String>,
        pub duration: Option<String>,
    }
}

/// Probes a media file using ffprobe to collect stream and format metadata.
///
/// Runs `<ffprobe> -loglevel quiet -print_format json -show_format -show_streams <path>`
/// and parses the JSON output.
pub fn probe_file(ffprobe: &Path, path: &Path) -> Result<ProbeResult, ProbeError> {
    let output = Command::new(ffprobe)
        .args([
            "-loglevel",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()?;

    if !output.status.success() {
        return Err(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {}",
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ffprobe_output(&stdout)
}

/// Probes a file and folds every failure into [`ProbeOutcome::Unreadable`].
pub fn probe(ffprobe: &Path, path: &Path) -> ProbeOutcome {
    match probe_file(ffprobe, path) {
        Ok(result) => ProbeOutcome::Readable(result),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "probe failed");
            ProbeOutcome::Unreadable {
                reason: e.to_string(),
            }
        }
    }
}

fn tag_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parses ffprobe JSON output into a ProbeResult.
pub fn parse_ffprobe_output(json_str: &str) -> Result<ProbeResult, ProbeError> {
    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let raw_streams = ffprobe
        .streams
        .ok_or_else(|| ProbeError::MissingField("streams".to_string()))?;
    let format = ffprobe
        .format
        .ok_or_else(|| ProbeError::MissingField("format".to_string()))?;

    let mut streams = Vec::with_capacity(raw_streams.len());

    for (position, stream) in raw_streams.into_iter().enumerate() {
        let index = stream
            .index
            .ok_or_else(|| ProbeError::MissingField(format!("streams[{}].index", position)))?;
        let codec_type = stream.codec_type.ok_or_else(|| {
            ProbeError::MissingField(format!("streams[{}].codec_type", position))
        })?;
        let kind = StreamKind::from_codec_type(&codec_type);

        let codec_name = match (kind, stream.codec_name) {
            (_, Some(name)) => name,
            (StreamKind::Other, None) => String::new(),
            (_, None) => {
                return Err(ProbeError::MissingField(format!(
                    "streams[{}].codec_name",
                    position
                )))
            }
        };

        let channel_count = match kind {
            StreamKind::Audio => Some(stream.channels.ok_or_else(|| {
                ProbeError::MissingField(format!("streams[{}].channels", position))
            })?),
            _ => None,
        };

        let tags = stream
            .tags
            .into_iter()
            .filter_map(|(k, v)| tag_to_string(v).map(|v| (k, v)))
            .collect();

        streams.push(StreamDescriptor {
            index,
            kind,
            codec_name,
            channel_count,
            tags,
        });
    }

    let format_name = format
        .format_name
        .ok_or_else(|| ProbeError::MissingField("format.format_name".to_string()))?;

    let duration_secs = format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok());

    Ok(ProbeResult {
        streams,
        format: FormatInfo {
            format_name,
            duration_secs,
        },
    })
}
