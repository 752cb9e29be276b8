//! The per-root writer task.
//!
//! A [`WatchSession`] owns a [`Reconciler`] and feeds it from an
//! [`EventStream`]. Events are debounced: a batch is applied once the stream has
//! been quiet for the debounce window, or once the oldest pending event reaches
//! the latency bound. Batches run on the blocking pool so index writes never
//! stall the runtime. Failed batches are retained and retried after a back-off.

use std::time::Duration;

use fdx_config::WatchSettings;
use tokio::{
    sync::watch,
    task::{self, JoinHandle},
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    WatchError,
    reconciler::{BatchOutcome, ReconcileStats, Reconciler},
    source::EventStream,
};

/// Timing of a watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Quiet period after the last event before a batch is applied.
    pub debounce: Duration,
    /// Longest a pending event waits while events keep arriving.
    pub max_latency: Duration,
    /// First delay after a failed batch; doubles up to `max_backoff`.
    pub retry_backoff: Duration,
    /// Cap on the retry delay.
    pub max_backoff: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from_settings(&WatchSettings::default())
    }
}

impl WatchOptions {
    /// Builds options from watch settings.
    pub fn from_settings(settings: &WatchSettings) -> Self {
        let debounce = Duration::from_millis(settings.debounce_ms);
        Self {
            debounce,
            max_latency: (debounce * 10).max(Duration::from_secs(1)),
            retry_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// A running writer task for one root.
pub struct WatchSession {
    /// Stops the task.
    cancel: CancellationToken,
    /// The task, returning the reconciler when it ends.
    handle: JoinHandle<Result<Reconciler, WatchError>>,
    /// Counters published after every cycle.
    stats: watch::Receiver<ReconcileStats>,
}

impl WatchSession {
    /// Spawns the writer task on the current runtime.
    pub fn spawn(reconciler: Reconciler, stream: EventStream, options: WatchOptions) -> Self {
        let cancel = CancellationToken::new();
        let (stats_tx, stats) = watch::channel(reconciler.stats());
        let handle = tokio::spawn(run(reconciler, stream, options, cancel.clone(), stats_tx));
        Self {
            cancel,
            handle,
            stats,
        }
    }

    /// Returns a receiver of the counters, updated after every cycle.
    pub fn subscribe(&self) -> watch::Receiver<ReconcileStats> {
        self.stats.clone()
    }

    /// Returns true once the task has ended on its own (the stream closed).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the session after applying everything already queued.
    pub async fn stop(self) -> Result<Reconciler, WatchError> {
        self.cancel.cancel();
        self.handle.await?
    }
}

/// Writer loop: wait, debounce, apply, repeat; drain on the way out.
async fn run(
    mut reconciler: Reconciler,
    mut stream: EventStream,
    options: WatchOptions,
    cancel: CancellationToken,
    stats: watch::Sender<ReconcileStats>,
) -> Result<Reconciler, WatchError> {
    info!(root = %reconciler.root().display(), "watch session started");
    let mut backoff = options.retry_backoff;
    let mut open = true;

    while open && !cancel.is_cancelled() {
        if !reconciler.has_work() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = stream.recv() => match event {
                    Some(event) => reconciler.observe(event),
                    None => break,
                },
            }
        }

        let deadline = Instant::now() + options.max_latency;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = stream.recv() => match event {
                    Some(event) => reconciler.observe(event),
                    None => {
                        open = false;
                        break;
                    }
                },
                () = time::sleep(options.debounce) => break,
                () = time::sleep_until(deadline) => break,
            }
        }

        let (returned, result) = apply(reconciler).await?;
        reconciler = returned;
        stats.send_replace(reconciler.stats());

        match result {
            Ok(outcome) => {
                debug!(?outcome, "cycle complete");
                backoff = options.retry_backoff;
            }
            Err(e) => {
                warn!(error = %e, retry_in = ?backoff, "batch failed, will retry");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {}
                    () = time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(options.max_backoff);
            }
        }
    }

    while let Some(event) = stream.try_recv() {
        reconciler.observe(event);
    }
    if reconciler.has_work() {
        let (returned, result) = apply(reconciler).await?;
        reconciler = returned;
        stats.send_replace(reconciler.stats());
        if let Err(e) = result {
            warn!(error = %e, pending = reconciler.pending_len(), "final drain failed");
        }
    }

    info!(root = %reconciler.root().display(), "watch session stopped");
    Ok(reconciler)
}

/// Runs one cycle on the blocking pool.
async fn apply(
    mut reconciler: Reconciler,
) -> Result<(Reconciler, Result<BatchOutcome, WatchError>), WatchError> {
    let pair = task::spawn_blocking(move || {
        let result = reconciler.reconcile();
        (reconciler, result)
    })
    .await?;
    Ok(pair)
}
