//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::codecs::CodecKind;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Codec name not present in the registry
    UnknownCodec {
        kind: CodecKind,
        name: String,
        valid: Vec<&'static str>,
    },
    /// A value that parsed but is not usable
    Invalid { field: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::UnknownCodec { kind, name, valid } => write!(
                f,
                "Unknown {} codec '{}'. Valid options: {}",
                kind,
                name,
                valid.join(", ")
            ),
            ConfigError::Invalid { field, reason } => {
                write!(f, "Invalid value for {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Library location and file selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryConfig {
    /// Root of the watched media tree
    #[serde(default = "default_library_root")]
    pub root: PathBuf,
    /// Scratch directory for encoder output before publish
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,
    /// Recognized container extensions (case-insensitive, leading dot optional)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_library_root() -> PathBuf {
    PathBuf::from("/media")
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("/tmp/media-recoder")
}

fn default_extensions() -> Vec<String> {
    [
        "mkv", "mp4", "avi", "mov", "m4v", "ts", "m2ts", "wmv", "flv", "webm", "mpg", "mpeg",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: default_library_root(),
            cache_root: default_cache_root(),
            extensions: default_extensions(),
        }
    }
}

/// Target codec policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyConfig {
    /// Target video codec name as reported by ffprobe (default "hevc")
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    /// Target audio codec for stereo/mono tracks (default "aac")
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    /// Output container extension (default "mkv")
    #[serde(default = "default_output_container")]
    pub output_container: String,
    /// Drop every subtitle stream instead of copying it
    #[serde(default)]
    pub remove_subtitles: bool,
    /// Bitrate for normalized stereo tracks (default "128k")
    #[serde(default = "default_stereo_bitrate")]
    pub stereo_bitrate: String,
    /// Tag normalized stereo tracks with a derived title
    #[serde(default)]
    pub retitle_stereo: bool,
}

fn default_video_codec() -> String {
    "hevc".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_output_container() -> String {
    "mkv".to_string()
}

fn default_stereo_bitrate() -> String {
    "128k".to_string()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            output_container: default_output_container(),
            remove_subtitles: false,
            stereo_bitrate: default_stereo_bitrate(),
            retitle_stereo: false,
        }
    }
}

/// Periodic scan and watch settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    /// Seconds between full library scans (default 3600)
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// Run a full scan as soon as the daemon starts (default true)
    #[serde(default = "default_true")]
    pub scan_on_startup: bool,
    /// Watch the library root for new files (default true)
    #[serde(default = "default_true")]
    pub watch: bool,
}

fn default_scan_interval_secs() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval_secs(),
            scan_on_startup: true,
            watch: true,
        }
    }
}

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffprobe: default_ffprobe(),
            ffmpeg: default_ffmpeg(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - LIBRARY_ROOT -> library.root
    /// - CACHE_ROOT -> library.cache_root
    /// - CONTAINER_EXTENSIONS -> library.extensions (comma separated)
    /// - TARGET_VIDEO_CODEC -> policy.video_codec
    /// - TARGET_AUDIO_CODEC -> policy.audio_codec
    /// - OUTPUT_CONTAINER -> policy.output_container
    /// - REMOVE_SUBTITLES -> policy.remove_subtitles
    /// - STEREO_BITRATE -> policy.stereo_bitrate
    /// - RETITLE_STEREO -> policy.retitle_stereo
    /// - SCAN_INTERVAL_SECS -> schedule.scan_interval_secs
    /// - SCAN_ON_STARTUP -> schedule.scan_on_startup
    /// - WATCH_ENABLED -> schedule.watch
    /// - FFPROBE_PATH -> tools.ffprobe
    /// - FFMPEG_PATH -> tools.ffmpeg
    /// - VERBOSE -> verbose
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("LIBRARY_ROOT") {
            if !val.is_empty() {
                self.library.root = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("CACHE_ROOT") {
            if !val.is_empty() {
                self.library.cache_root = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("CONTAINER_EXTENSIONS") {
            let extensions: Vec<String> = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !extensions.is_empty() {
                self.library.extensions = extensions;
            }
        }

        if let Ok(val) = env::var("TARGET_VIDEO_CODEC") {
            if !val.is_empty() {
                self.policy.video_codec = val;
            }
        }

        if let Ok(val) = env::var("TARGET_AUDIO_CODEC") {
            if !val.is_empty() {
                self.policy.audio_codec = val;
            }
        }

        if let Ok(val) = env::var("OUTPUT_CONTAINER") {
            if !val.is_empty() {
                self.policy.output_container = val;
            }
        }

        if let Ok(val) = env::var("REMOVE_SUBTITLES") {
            if let Some(flag) = parse_bool(&val) {
                self.policy.remove_subtitles = flag;
            }
        }

        if let Ok(val) = env::var("STEREO_BITRATE") {
            if !val.is_empty() {
                self.policy.stereo_bitrate = val;
            }
        }

        if let Ok(val) = env::var("RETITLE_STEREO") {
            if let Some(flag) = parse_bool(&val) {
                self.policy.retitle_stereo = flag;
            }
        }

        if let Ok(val) = env::var("SCAN_INTERVAL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.schedule.scan_interval_secs = secs;
            }
        }

        if let Ok(val) = env::var("SCAN_ON_STARTUP") {
            if let Some(flag) = parse_bool(&val) {
                self.schedule.scan_on_startup = flag;
            }
        }

        if let Ok(val) = env::var("WATCH_ENABLED") {
            if let Some(flag) = parse_bool(&val) {
                self.schedule.watch = flag;
            }
        }

        if let Ok(val) = env::var("FFPROBE_PATH") {
            if !val.is_empty() {
                self.tools.ffprobe = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("FFMPEG_PATH") {
            if !val.is_empty() {
                self.tools.ffmpeg = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("VERBOSE") {
            if let Some(flag) = parse_bool(&val) {
                self.verbose = flag;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = if path.as_ref().exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }
}
