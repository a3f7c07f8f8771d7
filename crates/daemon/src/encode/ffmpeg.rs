//! ffmpeg command synthesis and execution.
//!
//! Turns an [`EncodePlan`] into an ordered argument list and runs ffmpeg with
//! its output captured.

use crate::config::Settings;
use crate::policy::{EncodePlan, PlanEntry, StreamAction};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Number of trailing stderr lines kept for failure logs.
const STDERR_TAIL_LINES: usize = 20;

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// ffmpeg process exited with non-zero status
    #[error("ffmpeg failed with exit code: {0}")]
    FfmpegFailed(i32),

    /// ffmpeg process was terminated by signal
    #[error("ffmpeg process was terminated by signal")]
    FfmpegTerminated,

    /// IO error while spawning ffmpeg
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully determined encoder invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl CommandSpec {
    /// Arguments as lossy UTF-8 strings, for logging and assertions.
    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Builds a `Command` ready for execution.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

struct Tokens(Vec<OsString>);

impl Tokens {
    fn push(&mut self, token: impl AsRef<OsStr>) -> &mut Self {
        self.0.push(token.as_ref().to_os_string());
        self
    }
}

fn map_directive(entry: &PlanEntry) -> Option<String> {
    let spec = entry.kind.specifier()?;
    Some(format!("0:{}:{}", spec, entry.source_ordinal))
}

fn codec_directives(tokens: &mut Tokens, entry: &PlanEntry) {
    let Some(spec) = entry.kind.specifier() else {
        return;
    };

    match &entry.action {
        StreamAction::Drop => {}
        StreamAction::Copy { output_index } => {
            tokens
                .push(format!("-c:{}:{}", spec, output_index))
                .push("copy");
        }
        StreamAction::Transcode {
            output_index,
            target,
        } => {
            // A video target applies to every video output stream.
            if spec == 'v' {
                tokens.push("-c:v").push(&target.encoder);
            } else {
                tokens
                    .push(format!("-c:{}:{}", spec, output_index))
                    .push(&target.encoder);
            }
            if let Some(bitrate) = &target.bitrate {
                tokens
                    .push(format!("-b:{}:{}", spec, output_index))
                    .push(bitrate);
            }
            if let Some(channels) = target.channels {
                tokens.push("-ac").push(channels.to_string());
            }
            if let Some(title) = &target.title {
                tokens
                    .push(format!("-metadata:s:{}:{}", spec, output_index))
                    .push(format!("title={}", title));
            }
        }
    }
}

/// Synthesizes the ffmpeg invocation for a plan.
///
/// Token order: input, global flags, one `-map` per retained stream in plan
/// order, then the codec directives for the same streams in the same order,
/// then `-y` and the output path. All maps precede all codec directives.
pub fn synthesize(
    input_path: &Path,
    output_path: &Path,
    plan: &EncodePlan,
    settings: &Settings,
) -> CommandSpec {
    let mut tokens = Tokens(Vec::new());

    tokens
        .push("-i")
        .push(input_path)
        .push("-hide_banner")
        .push("-loglevel")
        .push("verbose")
        .push("-strict")
        .push("-2");

    for entry in plan.retained() {
        if let Some(map) = map_directive(entry) {
            tokens.push("-map").push(map);
        }
    }

    for entry in plan.retained() {
        codec_directives(&mut tokens, entry);
    }

    tokens.push("-y").push(output_path);

    CommandSpec {
        program: settings.ffmpeg.as_os_str().to_os_string(),
        args: tokens.0,
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Runs ffmpeg with stdout/stderr captured.
pub fn run_ffmpeg(spec: &CommandSpec) -> Result<(), EncodeError> {
    let output = spec.to_command().output()?;

    if output.status.success() {
        Ok(())
    } else {
        tracing::debug!(stderr = %stderr_tail(&output.stderr), "ffmpeg stderr");
        match output.status.code() {
            Some(code) => Err(EncodeError::FfmpegFailed(code)),
            None => Err(EncodeError::FfmpegTerminated),
        }
    }
}

/// Runs the encoder; exit status is the only success signal.
pub fn execute(spec: &CommandSpec) -> bool {
    match run_ffmpeg(spec) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "encode failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::build_plan;
    use crate::policy::test_support::{result, settings, stream};
    use crate::probe::StreamKind;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn contains_sequence(args: &[String], seq: &[&str]) -> bool {
        args.windows(seq.len())
            .any(|w| w.iter().zip(seq).all(|(a, b)| a == b))
    }

    fn position(args: &[String], token: &str) -> usize {
        args.iter()
            .position(|a| a == token)
            .unwrap_or_else(|| panic!("{} not found in {:?}", token, args))
    }

    #[test]
    fn test_simple_convert_tokens() {
        let cfg = settings();
        let probe = result(vec![
            stream(0, StreamKind::Video, "h264", None),
            stream(1, StreamKind::Audio, "ac3", Some(2)),
        ]);
        let plan = build_plan(&probe, &cfg);
        let spec = synthesize(
            Path::new("/media/in.avi"),
            Path::new("/cache/in.mkv"),
            &plan,
            &cfg,
        );
        let args = spec.arg_strings();

        assert_eq!(spec.program, OsString::from("ffmpeg"));
        assert_eq!(
            args,
            vec![
                "-i", "/media/in.avi", "-hide_banner", "-loglevel", "verbose", "-strict", "-2",
                "-map", "0:v:0", "-map", "0:a:0",
                "-c:v", "libx265", "-c:a:0", "aac", "-b:a:0", "128k", "-ac", "2",
                "-y", "/cache/in.mkv",
            ]
        );
    }

    #[test]
    fn test_surround_copy_not_transcoded() {
        let cfg = settings();
        let probe = result(vec![
            stream(0, StreamKind::Video, "h264", None),
            stream(1, StreamKind::Audio, "truehd", Some(8)),
        ]);
        let args = synthesize(
            Path::new("in.mkv"),
            Path::new("out.mkv"),
            &build_plan(&probe, &cfg),
            &cfg,
        )
        .arg_strings();

        assert!(contains_sequence(&args, &["-map", "0:a:0"]));
        assert!(contains_sequence(&args, &["-c:a:0", "copy"]));
        assert!(!args.iter().any(|a| a == "-b:a:0" || a == "-ac"));
    }

    #[test]
    fn test_removed_subtitles_absent_everywhere() {
        let mut cfg = settings();
        cfg.remove_subtitles = true;
        let probe = result(vec![
            stream(0, StreamKind::Video, "h264", None),
            stream(1, StreamKind::Subtitle, "subrip", None),
            stream(2, StreamKind::Audio, "aac", Some(2)),
        ]);
        let args = synthesize(
            Path::new("in.mkv"),
            Path::new("out.mkv"),
            &build_plan(&probe, &cfg),
            &cfg,
        )
        .arg_strings();

        assert!(!args.iter().any(|a| a.contains(":s:") || a.starts_with("-c:s")));
        assert_eq!(args.iter().filter(|a| *a == "-map").count(), 2);
    }

    #[test]
    fn test_kept_subtitles_copied() {
        let cfg = settings();
        let probe = result(vec![
            stream(0, StreamKind::Video, "h264", None),
            stream(1, StreamKind::Subtitle, "subrip", None),
        ]);
        let args = synthesize(
            Path::new("in.mkv"),
            Path::new("out.mkv"),
            &build_plan(&probe, &cfg),
            &cfg,
        )
        .arg_strings();

        assert!(contains_sequence(&args, &["-map", "0:s:0"]));
        assert!(contains_sequence(&args, &["-c:s:0", "copy"]));
    }

    #[test]
    fn test_maps_precede_codecs_and_output_last() {
        let cfg = settings();
        let probe = result(vec![
            stream(0, StreamKind::Video, "h264", None),
            stream(1, StreamKind::Audio, "dts", Some(6)),
            stream(2, StreamKind::Audio, "mp3", Some(2)),
            stream(3, StreamKind::Subtitle, "ass", None),
        ]);
        let args = synthesize(
            Path::new("in.mkv"),
            Path::new("out.mkv"),
            &build_plan(&probe, &cfg),
            &cfg,
        )
        .arg_strings();

        let last_map = args.iter().rposition(|a| a == "-map").unwrap();
        let first_codec = args.iter().position(|a| a.starts_with("-c:")).unwrap();
        assert!(last_map < first_codec);
        assert!(position(&args, "-strict") < position(&args, "-map"));
        assert_eq!(&args[args.len() - 2..], ["-y", "out.mkv"]);
        assert!(contains_sequence(
            &args,
            &["-map", "0:v:0", "-map", "0:a:0", "-map", "0:a:1", "-map", "0:s:0"]
        ));
    }

    #[test]
    fn test_retitle_adds_metadata() {
        let mut cfg = settings();
        cfg.retitle_stereo = true;
        let probe = result(vec![
            stream(0, StreamKind::Video, "h264", None),
            stream(1, StreamKind::Audio, "aac", Some(2)),
        ]);
        let args = synthesize(
            Path::new("in.mkv"),
            Path::new("out.mkv"),
            &build_plan(&probe, &cfg),
            &cfg,
        )
        .arg_strings();

        assert!(contains_sequence(&args, &["-metadata:s:a:0", "title=Stereo"]));
    }

    #[test]
    fn test_execute_reports_spawn_failure() {
        let spec = CommandSpec {
            program: OsString::from("/nonexistent/bin/ffmpeg"),
            args: vec![],
        };
        assert!(!execute(&spec));
        assert!(matches!(run_ffmpeg(&spec), Err(EncodeError::Io(_))));
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        let tail = stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 49"));
    }

    fn path_strategy() -> impl Strategy<Value = String> {
        prop::string::string_regex("/[a-zA-Z0-9_/.-]{1,40}").unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_synthesis_is_deterministic(
            input in path_strategy(),
            output in path_strategy(),
            audio_channels in prop::collection::vec(1u32..9, 0..6),
            subtitles in 0usize..4,
            remove_subtitles in proptest::bool::ANY,
        ) {
            let mut cfg = settings();
            cfg.remove_subtitles = remove_subtitles;

            let mut streams = vec![stream(0, StreamKind::Video, "h264", None)];
            for ch in &audio_channels {
                let idx = streams.len() as u32;
                streams.push(stream(idx, StreamKind::Audio, "ac3", Some(*ch)));
            }
            for _ in 0..subtitles {
                let idx = streams.len() as u32;
                streams.push(stream(idx, StreamKind::Subtitle, "subrip", None));
            }
            let probe = result(streams);
            let input = PathBuf::from(input);
            let output = PathBuf::from(output);

            let first = synthesize(&input, &output, &build_plan(&probe, &cfg), &cfg);
            let second = synthesize(&input, &output, &build_plan(&probe, &cfg), &cfg);
            prop_assert_eq!(&first, &second);

            let args = first.arg_strings();
            let retained = build_plan(&probe, &cfg).retained().count();
            prop_assert_eq!(args.iter().filter(|a| *a == "-map").count(), retained);
        }
    }
}
