//! Fixed registry of target codecs the daemon can encode to.

use serde::Serialize;

/// Stream kind a codec applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CodecKind {
    Video,
    Audio,
}

impl std::fmt::Display for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecKind::Video => write!(f, "video"),
            CodecKind::Audio => write!(f, "audio"),
        }
    }
}

/// A registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Codec {
    pub kind: CodecKind,
    /// Name as reported by ffprobe in `codec_name`.
    pub name: &'static str,
    /// Human readable label.
    pub label: &'static str,
    /// ffmpeg encoder identifier passed to `-c`.
    pub encoder: &'static str,
}

pub const REGISTRY: &[Codec] = &[
    Codec { kind: CodecKind::Video, name: "hevc", label: "H.265 / HEVC", encoder: "libx265" },
    Codec { kind: CodecKind::Video, name: "h264", label: "H.264 / AVC", encoder: "libx264" },
    Codec { kind: CodecKind::Video, name: "av1", label: "AV1", encoder: "libsvtav1" },
    Codec { kind: CodecKind::Video, name: "vp9", label: "VP9", encoder: "libvpx-vp9" },
    Codec { kind: CodecKind::Audio, name: "aac", label: "AAC", encoder: "aac" },
    Codec { kind: CodecKind::Audio, name: "opus", label: "Opus", encoder: "libopus" },
    Codec { kind: CodecKind::Audio, name: "ac3", label: "Dolby Digital", encoder: "ac3" },
    Codec { kind: CodecKind::Audio, name: "eac3", label: "Dolby Digital Plus", encoder: "eac3" },
    Codec { kind: CodecKind::Audio, name: "mp3", label: "MP3", encoder: "libmp3lame" },
    Codec { kind: CodecKind::Audio, name: "flac", label: "FLAC", encoder: "flac" },
];

/// Looks up a codec by kind and name (case-insensitive).
pub fn find(kind: CodecKind, name: &str) -> Option<&'static Codec> {
    REGISTRY
        .iter()
        .find(|c| c.kind == kind && c.name.eq_ignore_ascii_case(name.trim()))
}

/// All registered names for a kind, in registry order.
pub fn names(kind: CodecKind) -> Vec<&'static str> {
    REGISTRY
        .iter()
        .filter(|c| c.kind == kind)
        .map(|c| c.name)
        .collect()
}
