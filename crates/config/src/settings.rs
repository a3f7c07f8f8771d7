//! Validated, immutable runtime settings.
//!
//! A [`Settings`] value is built once at startup from a [`Config`] and then
//! shared read-only by every component of the pipeline.

use std::path::PathBuf;
use std::time::Duration;

use crate::codecs::{self, Codec, CodecKind};
use crate::config::{Config, ConfigError};

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub library_root: PathBuf,
    pub cache_root: PathBuf,
    /// Lowercase, without leading dot.
    pub extensions: Vec<String>,
    pub video_codec: &'static Codec,
    pub audio_codec: &'static Codec,
    /// Lowercase, without leading dot.
    pub output_container: String,
    pub remove_subtitles: bool,
    pub stereo_bitrate: String,
    pub retitle_stereo: bool,
    pub scan_interval: Duration,
    pub scan_on_startup: bool,
    pub watch: bool,
    pub ffprobe: PathBuf,
    pub ffmpeg: PathBuf,
    pub verbose: bool,
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

fn resolve_codec(kind: CodecKind, name: &str) -> Result<&'static Codec, ConfigError> {
    codecs::find(kind, name).ok_or_else(|| ConfigError::UnknownCodec {
        kind,
        name: name.to_string(),
        valid: codecs::names(kind),
    })
}

/// Accepts `<digits>`, `<digits>k` or `<digits>M`, the forms ffmpeg takes for `-b`.
pub fn is_valid_bitrate(value: &str) -> bool {
    let digits = value
        .strip_suffix(['k', 'K', 'M'])
        .unwrap_or(value);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) && digits != "0"
}

impl Settings {
    /// Validates a loaded configuration against the codec registry.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let video_codec = resolve_codec(CodecKind::Video, &config.policy.video_codec)?;
        let audio_codec = resolve_codec(CodecKind::Audio, &config.policy.audio_codec)?;

        let output_container = normalize_extension(&config.policy.output_container);
        if output_container.is_empty() {
            return Err(ConfigError::Invalid {
                field: "policy.output_container",
                reason: "must not be empty".to_string(),
            });
        }

        let stereo_bitrate = config.policy.stereo_bitrate.trim().to_string();
        if !is_valid_bitrate(&stereo_bitrate) {
            return Err(ConfigError::Invalid {
                field: "policy.stereo_bitrate",
                reason: format!("'{}' is not a bitrate like 128k", stereo_bitrate),
            });
        }

        if config.schedule.scan_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "schedule.scan_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        let mut extensions: Vec<String> = Vec::new();
        for ext in config.library.extensions.iter().map(|e| normalize_extension(e)) {
            if !ext.is_empty() && !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }
        if extensions.is_empty() {
            return Err(ConfigError::Invalid {
                field: "library.extensions",
                reason: "at least one container extension is required".to_string(),
            });
        }

        Ok(Self {
            library_root: config.library.root.clone(),
            cache_root: config.library.cache_root.clone(),
            extensions,
            video_codec,
            audio_codec,
            output_container,
            remove_subtitles: config.policy.remove_subtitles,
            stereo_bitrate,
            retitle_stereo: config.policy.retitle_stereo,
            scan_interval: Duration::from_secs(config.schedule.scan_interval_secs),
            scan_on_startup: config.schedule.scan_on_startup,
            watch: config.schedule.watch,
            ffprobe: config.tools.ffprobe.clone(),
            ffmpeg: config.tools.ffmpeg.clone(),
            verbose: config.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = Settings::from_config(&Config::default()).expect("defaults are valid");
        assert_eq!(settings.video_codec.encoder, "libx265");
        assert_eq!(settings.audio_codec.encoder, "aac");
        assert_eq!(settings.output_container, "mkv");
        assert_eq!(settings.scan_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_unknown_video_codec_lists_options() {
        let mut config = Config::default();
        config.policy.video_codec = "mpeg2video".to_string();

        let err = Settings::from_config(&config).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("mpeg2video"));
        assert!(msg.contains("hevc, h264, av1, vp9"));
    }

    #[test]
    fn test_unknown_audio_codec() {
        let mut config = Config::default();
        config.policy.audio_codec = "hevc".to_string();

        assert!(matches!(
            Settings::from_config(&config),
            Err(ConfigError::UnknownCodec { kind: CodecKind::Audio, .. })
        ));
    }

    #[test]
    fn test_extensions_and_container_normalized() {
        let mut config = Config::default();
        config.library.extensions = vec![".MKV".into(), "Mp4".into(), " ".into()];
        config.policy.output_container = ".MKV".into();

        let settings = Settings::from_config(&config).unwrap();
        assert_eq!(settings.extensions, vec!["mkv", "mp4"]);
        assert_eq!(settings.output_container, "mkv");
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config::default();
        config.policy.stereo_bitrate = "loud".into();
        assert!(Settings::from_config(&config).is_err());

        let mut config = Config::default();
        config.schedule.scan_interval_secs = 0;
        assert!(Settings::from_config(&config).is_err());

        let mut config = Config::default();
        config.library.extensions.clear();
        assert!(Settings::from_config(&config).is_err());
    }

    #[test]
    fn test_bitrate_forms() {
        assert!(is_valid_bitrate("128k"));
        assert!(is_valid_bitrate("192000"));
        assert!(is_valid_bitrate("1M"));
        assert!(!is_valid_bitrate("k"));
        assert!(!is_valid_bitrate("0"));
        assert!(!is_valid_bitrate("12.5k"));
    }
}
