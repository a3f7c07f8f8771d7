//! Media recoder daemon
//!
//! Watches a media library and re-encodes video files that do not match the
//! target codec policy, replacing the original once the result is verified.

pub mod daemon;
pub mod encode;
pub mod pipeline;
pub mod policy;
pub mod probe;
pub mod publish;
pub mod scan;
pub mod startup;
pub mod watch;

pub use media_recoder_config as config;
pub use media_recoder_config::{Config, Settings};
pub use daemon::{Daemon, DaemonError, PathQueue, RunSummary};
pub use encode::{execute, synthesize, CommandSpec, EncodeError};
pub use pipeline::{process_file, FileState, SkipReason};
pub use policy::{build_plan, needs_processing, EncodePlan, PlanEntry, StreamAction};
pub use probe::{probe, ProbeError, ProbeOutcome, ProbeResult, StreamDescriptor, StreamKind};
pub use publish::{publish, verify, PublishError};
pub use startup::{run_startup_checks, StartupError};
