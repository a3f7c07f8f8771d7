//! CLI entry point for the media recoder
//!
//! Parses command line arguments, sets up logging and starts the daemon.

use media_recoder::{Config, Daemon, DaemonError, Settings};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// Media recoder - keeps a media library on one video codec
#[derive(Parser, Debug)]
#[command(name = "media-recoder")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml). Missing file means defaults.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Scan the library once, process every file, then exit.
    #[arg(long, default_value = "false")]
    once: bool,

    /// Verbose logging (also settable via VERBOSE or the config file).
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Skip startup checks (ffprobe, ffmpeg, encoders). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

fn init_logging(verbose: bool) {
    // RUST_LOG wins when set
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "media_recoder=debug,media_recoder_cli=debug".to_string()
        } else {
            "media_recoder=info,media_recoder_cli=info".to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn build_daemon(args: &Args) -> Result<Daemon, DaemonError> {
    if args.skip_checks {
        tracing::warn!("skipping startup checks (--skip-checks enabled)");
        let config = Config::load_or_default(&args.config)?;
        let settings = Settings::from_config(&config)?;
        Ok(Daemon::with_settings(settings))
    } else {
        Daemon::new(&args.config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logging depends on the verbosity flag, which may come from the config file.
    let config_verbose = Config::load_or_default(&args.config)
        .map(|c| c.verbose)
        .unwrap_or(false);
    init_logging(args.verbose || config_verbose);

    tracing::info!(config = %args.config.display(), "media recoder starting");

    let daemon = match build_daemon(&args) {
        Ok(daemon) => daemon,
        Err(e) => {
            tracing::error!("failed to initialize: {}", e);
            eprintln!("Failed to initialize daemon: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let settings = &daemon.settings;
    tracing::info!(
        root = %settings.library_root.display(),
        cache = %settings.cache_root.display(),
        video = settings.video_codec.label,
        audio = settings.audio_codec.label,
        container = %settings.output_container,
        "daemon initialized"
    );

    if args.once {
        return match daemon.run_once().await {
            Ok(summary) => {
                tracing::info!(?summary, "scan complete");
                if summary.publish_failed > 0 {
                    ExitCode::FAILURE
                } else {
                    ExitCode::SUCCESS
                }
            }
            Err(e) => {
                tracing::error!("run failed: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let cancel = daemon.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested, waiting for the current file to finish");
            cancel.cancel();
        }
    });

    match daemon.run_with_tasks().await {
        Ok(summary) => {
            tracing::info!(?summary, "daemon stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("daemon error: {}", e);
            ExitCode::FAILURE
        }
    }
}
