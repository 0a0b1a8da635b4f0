//! Worker-thread build offload.
//!
//! Above the configured batch-size threshold, index builds run on a
//! dedicated OS thread (with rayon parallelizing the parse phase inside
//! it) so the embedding host's cooperative event loop is never starved.
//!
//! The boundary speaks three message shapes over a channel: zero or more
//! fire-and-forget [`BuildUpdate::Progress`] notifications, then exactly
//! one terminal [`BuildUpdate::Done`] or [`BuildUpdate::Failed`].
//! Cancellation is cooperative: the caller raises a flag, the worker stops
//! emitting, and after a bounded timeout the caller detaches regardless of
//! acknowledgment. A timed-out cancel is "cancelled", never an error.

use crate::config::Config;
use crate::error::Result;
use crate::index::IndexBuilder;
use crate::parser::ParseCache;
use crate::types::BuildResult;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Messages sent from the worker to the caller.
#[derive(Debug)]
pub enum BuildUpdate {
    /// Fire-and-forget progress notification.
    Progress {
        /// Files processed so far
        processed: usize,
        /// Total files in the batch
        total: usize,
        /// File currently being parsed
        current_file: PathBuf,
    },
    /// Terminal: the build finished.
    Done(Box<BuildResult>),
    /// Terminal: the build crashed.
    Failed(String),
}

/// Handle to an in-flight worker build.
pub struct WorkerHandle {
    updates: mpsc::UnboundedReceiver<BuildUpdate>,
    cancel: Arc<AtomicBool>,
    cancel_timeout: Duration,
}

impl WorkerHandle {
    /// Receive the next update. `None` once the worker is gone.
    pub async fn recv(&mut self) -> Option<BuildUpdate> {
        self.updates.recv().await
    }

    /// Wait for the terminal result, discarding progress updates.
    ///
    /// # Errors
    ///
    /// Returns `Worker` when the build crashed and `Cancelled` when the
    /// worker went away without a terminal message.
    pub async fn wait(mut self) -> Result<BuildResult> {
        while let Some(update) = self.recv().await {
            match update {
                BuildUpdate::Progress { .. } => {}
                BuildUpdate::Done(result) => return Ok(*result),
                BuildUpdate::Failed(message) => {
                    return Err(crate::err!(Worker { message: message }));
                }
            }
        }
        Err(crate::err!(Cancelled {}))
    }

    /// Cancel the build cooperatively.
    ///
    /// Raises the cancel flag and waits up to the configured timeout for
    /// the worker's channel to close. "No response within the timeout" is
    /// treated exactly like an acknowledged cancel; the detached thread
    /// runs to completion into a closed channel.
    pub async fn cancel(mut self) {
        self.cancel.store(true, Ordering::Relaxed);

        let drain = async {
            while self.updates.recv().await.is_some() {
                // discard whatever was already in flight
            }
        };
        if tokio::time::timeout(self.cancel_timeout, drain).await.is_err() {
            tracing::warn!(
                timeout_ms = self.cancel_timeout.as_millis() as u64,
                "Worker did not acknowledge cancel in time; detaching"
            );
        }
    }
}

/// Spawn an index build on a dedicated OS thread.
///
/// A panic inside the build is caught and reported as a terminal
/// [`BuildUpdate::Failed`]; the caller can start a fresh build afterwards.
#[must_use]
pub fn spawn_build(
    config: Config,
    cache: Arc<ParseCache>,
    files: Vec<PathBuf>,
) -> WorkerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_timeout = Duration::from_millis(config.index.cancel_timeout_ms);

    let worker_cancel = Arc::clone(&cancel);
    std::thread::Builder::new()
        .name("terracarta-index".to_string())
        .spawn(move || {
            let progress_tx = tx.clone();
            let progress_cancel = Arc::clone(&worker_cancel);
            let progress = move |processed: usize, total: usize, current: &std::path::Path| {
                if progress_cancel.load(Ordering::Relaxed) {
                    return;
                }
                let _ = progress_tx.send(BuildUpdate::Progress {
                    processed,
                    total,
                    current_file: current.to_path_buf(),
                });
            };

            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let builder = IndexBuilder::new(&config, &cache);
                builder.build_parallel(&files, Some(&worker_cancel), Some(&progress))
            }));

            // A cancelled worker stays silent; the caller already moved on.
            if worker_cancel.load(Ordering::Relaxed) {
                return;
            }

            match outcome {
                Ok(result) => {
                    let _ = tx.send(BuildUpdate::Done(Box::new(result)));
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(error = %message, "Index worker panicked");
                    let _ = tx.send(BuildUpdate::Failed(message));
                }
            }
        })
        .expect("failed to spawn index worker thread");

    WorkerHandle {
        updates: rx,
        cancel,
        cancel_timeout,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
