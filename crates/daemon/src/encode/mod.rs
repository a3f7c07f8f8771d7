//! Encoding modules for the media recoder

pub mod ffmpeg;

pub use ffmpeg::{execute, run_ffmpeg, synthesize, CommandSpec, EncodeError};
