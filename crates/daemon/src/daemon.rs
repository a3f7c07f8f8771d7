//! Daemon startup and main loop for the media recoder
//!
//! Two producers feed one path queue: the library watcher and the periodic
//! full scan. A single consumer takes paths off the queue and runs them
//! through the pipeline one at a time.

use crate::config::{Config, ConfigError, Settings};
use crate::pipeline::{process_file, process_file_async, FileState};
use crate::scan::scan_library;
use crate::startup::{run_startup_checks, StartupError};
use crate::watch::run_watcher;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Capacity of the path queue.
const QUEUE_CAPACITY: usize = 1024;

/// How often the scheduler wakes up to check whether a scan is due.
const SCHEDULER_TICK: Duration = Duration::from_secs(1);

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Path queue closed
    #[error("Queue error: {0}")]
    Queue(String),
}

/// Counts of terminal states over a batch of files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
    pub verify_failed: usize,
    pub publish_failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, state: &FileState) {
        match state {
            FileState::Published(_) => self.published += 1,
            FileState::Skipped(_) => self.skipped += 1,
            FileState::Failed(_) => self.failed += 1,
            FileState::VerifyFailed(_) => self.verify_failed += 1,
            FileState::PublishFailed(_) => self.publish_failed += 1,
            _ => {}
        }
    }

    pub fn total(&self) -> usize {
        self.published + self.skipped + self.failed + self.verify_failed + self.publish_failed
    }
}

/// Sending half of the path queue. Paths already waiting are not queued twice.
#[derive(Clone)]
pub struct PathQueue {
    tx: mpsc::Sender<PathBuf>,
    queued: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PathQueue {
    /// Queue a path. Returns `Ok(false)` if it was already waiting.
    pub async fn submit(&self, path: PathBuf) -> Result<bool, DaemonError> {
        {
            let mut queued = self.queued.lock().await;
            if !queued.insert(path.clone()) {
                return Ok(false);
            }
        }

        if let Err(e) = self.tx.send(path).await {
            self.queued.lock().await.remove(&e.0);
            return Err(DaemonError::Queue(format!("Failed to queue path: {}", e)));
        }
        Ok(true)
    }

    async fn taken(&self, path: &Path) {
        self.queued.lock().await.remove(path);
    }

    /// Number of paths waiting.
    pub async fn len(&self) -> usize {
        self.queued.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Daemon state containing all runtime components
pub struct Daemon {
    /// Validated settings shared by every component
    pub settings: Arc<Settings>,
    queue: PathQueue,
    /// Path queue receiver (wrapped for async access)
    rx: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
    cancel: CancellationToken,
}

impl Daemon {
    /// Initialize the daemon with configuration from file
    ///
    /// This performs the full startup sequence:
    /// 1. Load config from file (defaults if missing)
    /// 2. Apply environment overrides
    /// 3. Validate against the codec registry
    /// 4. Run startup checks (ffprobe, ffmpeg, encoders, cache root)
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Self, DaemonError> {
        let config = Config::load_or_default(config_path)?;
        let settings = Settings::from_config(&config)?;
        run_startup_checks(&settings)?;
        Ok(Self::with_settings(settings))
    }

    /// Initialize the daemon without running startup checks
    ///
    /// Useful for testing when the external tools are not available.
    pub fn with_settings(settings: Settings) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);

        Self {
            settings: Arc::new(settings),
            queue: PathQueue {
                tx,
                queued: Arc::new(Mutex::new(HashSet::new())),
            },
            rx: Arc::new(Mutex::new(rx)),
            cancel: CancellationToken::new(),
        }
    }

    /// Get a clone of the queue for external submission
    pub fn queue(&self) -> PathQueue {
        self.queue.clone()
    }

    /// Token that stops the watcher, scheduler and main loop when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request shutdown. An in-flight file finishes first.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Walk the library and queue every candidate. Returns the number queued.
    pub async fn scan_and_submit(&self) -> Result<usize, DaemonError> {
        scan_and_submit(&self.settings, &self.queue).await
    }

    /// Start the library watcher as a background task
    pub fn start_watcher(&self) -> tokio::task::JoinHandle<()> {
        let settings = self.settings.clone();
        let cancel = self.cancel.clone();
        let queue = self.queue.clone();

        tokio::spawn(async move {
            let submit = |path: PathBuf| {
                let queue = queue.clone();
                async move {
                    if let Err(e) = queue.submit(path).await {
                        tracing::warn!(error = %e, "watcher could not queue path");
                    }
                }
            };
            if let Err(e) = run_watcher(settings, cancel, submit).await {
                tracing::error!(error = %e, "file watcher stopped");
            }
        })
    }

    /// Start the periodic scan task
    ///
    /// Sleeps in short ticks and runs a full scan whenever the interval has
    /// elapsed. With `scan_on_startup` the first scan runs immediately.
    pub fn start_scheduler(&self) -> tokio::task::JoinHandle<()> {
        let settings = self.settings.clone();
        let cancel = self.cancel.clone();
        let queue = self.queue.clone();

        tokio::spawn(async move {
            let mut last_scan = if settings.scan_on_startup {
                None
            } else {
                Some(Instant::now())
            };

            loop {
                let due = last_scan.map_or(true, |t| t.elapsed() >= settings.scan_interval);
                if due {
                    // A full queue must not hold up shutdown.
                    tokio::select! {
                        result = scan_and_submit(&settings, &queue) => match result {
                            Ok(count) => tracing::info!(queued = count, "scheduled scan complete"),
                            Err(e) => tracing::warn!(error = %e, "scheduled scan failed"),
                        },
                        _ = cancel.cancelled() => break,
                    }
                    last_scan = Some(Instant::now());
                }

                tokio::select! {
                    _ = tokio::time::sleep(SCHEDULER_TICK) => {}
                    _ = cancel.cancelled() => break,
                }
            }
            tracing::info!("scheduler stopped");
        })
    }

    /// Run the daemon main loop
    ///
    /// Takes paths off the queue and processes them one at a time until
    /// cancelled. Per-file failures are reported and never end the loop.
    pub async fn run(&self) -> Result<RunSummary, DaemonError> {
        let mut summary = RunSummary::default();

        loop {
            let next = {
                let mut rx = self.rx.lock().await;
                tokio::select! {
                    _ = self.cancel.cancelled() => None,
                    path = rx.recv() => path,
                }
            };

            let Some(path) = next else { break };
            self.queue.taken(&path).await;

            let state = process_file_async(path, self.settings.clone()).await;
            summary.record(&state);
        }

        tracing::info!(
            published = summary.published,
            skipped = summary.skipped,
            failed = summary.failed + summary.verify_failed + summary.publish_failed,
            "main loop stopped"
        );
        Ok(summary)
    }

    /// Run the daemon with all background tasks
    ///
    /// Starts the watcher (when enabled) and the scheduler, then runs the main
    /// loop. Waits for both tasks to stop before returning.
    pub async fn run_with_tasks(&self) -> Result<RunSummary, DaemonError> {
        let watcher = self.settings.watch.then(|| self.start_watcher());
        let scheduler = self.start_scheduler();

        let summary = self.run().await;

        self.cancel.cancel();
        if let Some(handle) = watcher {
            join_task("watcher", handle).await;
        }
        join_task("scheduler", scheduler).await;
        summary
    }

    /// Scan the library once and process every candidate serially
    pub async fn run_once(&self) -> Result<RunSummary, DaemonError> {
        let settings = self.settings.clone();
        let paths = tokio::task::spawn_blocking(move || {
            scan_library(
                &settings.library_root,
                &settings.extensions,
                Some(&settings.cache_root),
            )
        })
        .await
        .map_err(|e| DaemonError::Queue(format!("scan task failed: {}", e)))?;

        let mut summary = RunSummary::default();
        for path in paths {
            if self.cancel.is_cancelled() {
                break;
            }
            let settings = self.settings.clone();
            let state = tokio::task::spawn_blocking(move || process_file(&path, &settings))
                .await
                .unwrap_or_else(|e| FileState::Failed(format!("pipeline task failed: {}", e)));
            summary.record(&state);
        }
        Ok(summary)
    }
}

/// Waits for a background task, logging a panic instead of propagating it.
/// Returns false if the task panicked.
async fn join_task(name: &str, handle: tokio::task::JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(task = name, error = %e, "background task panicked");
            false
        }
    }
}

async fn scan_and_submit(settings: &Arc<Settings>, queue: &PathQueue) -> Result<usize, DaemonError> {
    let scan_settings = settings.clone();
    let paths = tokio::task::spawn_blocking(move || {
        scan_library(
            &scan_settings.library_root,
            &scan_settings.extensions,
            Some(&scan_settings.cache_root),
        )
    })
    .await
    .map_err(|e| DaemonError::Queue(format!("scan task failed: {}", e)))?;

    let mut queued = 0;
    for path in paths {
        if queue.submit(path).await? {
            queued += 1;
        }
    }
    Ok(queued)
}
