//! Policy engine.
//!
//! Decides whether a probed file needs re-encoding and, if so, what happens to
//! each of its streams. The resulting [`EncodePlan`] is a pure value and the
//! sole input to command synthesis.

use crate::config::Settings;
use crate::probe::{ProbeOutcome, ProbeResult, StreamDescriptor, StreamKind};
use serde::Serialize;

/// Channel count stereo tracks are normalized to.
pub const STEREO_CHANNELS: u32 = 2;

/// Encoder parameters for a transcoded stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscodeTarget {
    /// ffmpeg encoder identifier (e.g., "libx265", "aac").
    pub encoder: String,
    pub bitrate: Option<String>,
    pub channels: Option<u32>,
    /// Title tag to write on the output stream.
    pub title: Option<String>,
}

/// Decision for one source stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StreamAction {
    /// Map the stream and copy it bit-for-bit.
    Copy { output_index: usize },
    /// Map the stream and re-encode it.
    Transcode {
        output_index: usize,
        target: TranscodeTarget,
    },
    /// Leave the stream out of the output.
    Drop,
}

impl StreamAction {
    /// Per-kind output index, `None` for dropped streams.
    pub fn output_index(&self) -> Option<usize> {
        match self {
            StreamAction::Copy { output_index } => Some(*output_index),
            StreamAction::Transcode { output_index, .. } => Some(*output_index),
            StreamAction::Drop => None,
        }
    }

    pub fn is_retained(&self) -> bool {
        !matches!(self, StreamAction::Drop)
    }
}

/// One plan entry per source stream, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    /// Absolute stream index in the source.
    pub source_index: u32,
    pub kind: StreamKind,
    /// Position of the stream among source streams of the same kind.
    pub source_ordinal: usize,
    pub action: StreamAction,
}

/// Per-stream decisions for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EncodePlan {
    pub entries: Vec<PlanEntry>,
}

impl EncodePlan {
    /// Entries that produce an output stream, in plan order.
    pub fn retained(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.action.is_retained())
    }
}

/// Running per-kind counters used while building a plan.
#[derive(Debug, Default)]
struct KindCounters {
    video: usize,
    audio: usize,
    subtitle: usize,
    other: usize,
}

impl KindCounters {
    fn slot(&mut self, kind: StreamKind) -> &mut usize {
        match kind {
            StreamKind::Video => &mut self.video,
            StreamKind::Audio => &mut self.audio,
            StreamKind::Subtitle => &mut self.subtitle,
            StreamKind::Other => &mut self.other,
        }
    }

    /// Returns the current value and advances the counter.
    fn next(&mut self, kind: StreamKind) -> usize {
        let slot = self.slot(kind);
        let value = *slot;
        *slot += 1;
        value
    }
}

/// True when at least one video stream already reports the target codec.
pub fn has_target_video(result: &ProbeResult, settings: &Settings) -> bool {
    result
        .video_streams()
        .any(|s| s.codec_name.eq_ignore_ascii_case(settings.video_codec.name))
}

/// Decides whether a file needs re-encoding.
///
/// Unreadable files and files without a video stream are never processed.
/// A file is compliant as soon as one video stream matches the target codec.
pub fn needs_processing(outcome: &ProbeOutcome, settings: &Settings) -> bool {
    match outcome {
        ProbeOutcome::Unreadable { .. } => false,
        ProbeOutcome::Readable(result) => {
            result.video_streams().next().is_some() && !has_target_video(result, settings)
        }
    }
}

/// Title for a normalized stereo track. Falls back to a fixed label when the
/// source has no usable title.
pub fn stereo_title(stream: &StreamDescriptor) -> String {
    const FALLBACK: &str = "Stereo";

    let base = match stream.title().map(str::trim) {
        Some(title) if !title.is_empty() => title,
        _ => return FALLBACK.to_string(),
    };

    if base.to_lowercase().contains("stereo") {
        base.to_string()
    } else {
        format!("{} ({})", base, FALLBACK)
    }
}

fn audio_action(
    stream: &StreamDescriptor,
    output_index: usize,
    settings: &Settings,
) -> StreamAction {
    match stream.channel_count {
        // Surround tracks are kept as-is. No downmixed sibling is produced.
        Some(channels) if channels > STEREO_CHANNELS => StreamAction::Copy { output_index },
        _ => StreamAction::Transcode {
            output_index,
            target: TranscodeTarget {
                encoder: settings.audio_codec.encoder.to_string(),
                bitrate: Some(settings.stereo_bitrate.clone()),
                channels: Some(STEREO_CHANNELS),
                title: settings.retitle_stereo.then(|| stereo_title(stream)),
            },
        },
    }
}

/// Builds the per-stream plan for a file that needs processing.
///
/// Every source stream gets exactly one entry, in source order. Retained
/// streams get a zero-based output index per kind in encounter order.
pub fn build_plan(result: &ProbeResult, settings: &Settings) -> EncodePlan {
    let mut source_counters = KindCounters::default();
    let mut output_counters = KindCounters::default();
    let mut entries = Vec::with_capacity(result.streams.len());

    for stream in &result.streams {
        let source_ordinal = source_counters.next(stream.kind);

        let retain = match stream.kind {
            StreamKind::Video | StreamKind::Audio => true,
            StreamKind::Subtitle => !settings.remove_subtitles,
            StreamKind::Other => false,
        };

        let action = if retain {
            let output_index = output_counters.next(stream.kind);
            match stream.kind {
                StreamKind::Video => StreamAction::Transcode {
                    output_index,
                    target: TranscodeTarget {
                        encoder: settings.video_codec.encoder.to_string(),
                        bitrate: None,
                        channels: None,
                        title: None,
                    },
                },
                StreamKind::Audio => audio_action(stream, output_index, settings),
                _ => StreamAction::Copy { output_index },
            }
        } else {
            StreamAction::Drop
        };

        entries.push(PlanEntry {
            source_index: stream.index,
            kind: stream.kind,
            source_ordinal,
            action,
        });
    }

    EncodePlan { entries }
}
