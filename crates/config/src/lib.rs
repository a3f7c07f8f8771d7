//! Configuration module for the media recoder
//!
//! Handles loading configuration from TOML files and environment variable overrides,
//! and validating it against the codec registry.

pub mod codecs;
pub mod config;
pub mod settings;

pub use codecs::{Codec, CodecKind};
pub use config::*;
pub use settings::Settings;
