//! Notification sources feeding a watch session.
//!
//! Producers push [`ChangeEvent`]s through an [`EventSender`] into a bounded
//! queue. A full queue never blocks the producer: the event is dropped and an
//! overflow flag is raised, which the consuming [`EventStream`] reports as a
//! [`ChangeKind::Overflow`] event ahead of anything still queued. Raising the
//! flag also wakes a consumer parked on an empty queue.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::{DateTime, Utc};
use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{ModifyKind, RenameMode},
};
use tokio::sync::{
    Notify,
    mpsc::{self, error::TrySendError},
};
use tracing::{debug, warn};

use crate::{
    WatchError,
    event::{ChangeEvent, ChangeKind},
};

/// Producer half of an event queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    /// Bounded queue.
    tx: mpsc::Sender<ChangeEvent>,
    /// Raised when an event had to be dropped.
    overflow: Arc<AtomicBool>,
    /// Wakes the stream when the flag is raised.
    wake: Arc<Notify>,
}

impl EventSender {
    /// Enqueues an event without blocking.
    ///
    /// Returns false if the event was dropped, either because the queue is full
    /// (the overflow flag is raised) or because the stream is gone.
    pub fn send(&self, event: ChangeEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                if !self.overflow.swap(true, Ordering::AcqRel) {
                    warn!(path = %event.path.display(), "event queue full, forcing rescan");
                }
                self.wake.notify_one();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Signals that events were lost upstream, even if nothing else follows.
    pub fn mark_overflow(&self) {
        self.overflow.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Returns true once the stream has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of an event queue.
#[derive(Debug)]
pub struct EventStream {
    /// Bounded queue.
    rx: mpsc::Receiver<ChangeEvent>,
    /// Raised by producers when events were dropped.
    overflow: Arc<AtomicBool>,
    /// Signalled alongside the flag.
    wake: Arc<Notify>,
}

impl EventStream {
    /// Creates a bounded queue holding at most `capacity` events.
    pub fn channel(capacity: usize) -> (EventSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let overflow = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        (
            EventSender {
                tx,
                overflow: Arc::clone(&overflow),
                wake: Arc::clone(&wake),
            },
            Self { rx, overflow, wake },
        )
    }

    /// Waits for the next event. Returns `None` once every sender is gone.
    ///
    /// An overflow raised while waiting ends the wait with an overflow event.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            if let Some(event) = self.take_overflow() {
                return Some(event);
            }
            tokio::select! {
                biased;
                () = self.wake.notified() => {}
                event = self.rx.recv() => return event,
            }
        }
    }

    /// Returns the next event if one is ready.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.take_overflow().or_else(|| self.rx.try_recv().ok())
    }

    /// Converts a raised overflow flag into an event, clearing it.
    fn take_overflow(&self) -> Option<ChangeEvent> {
        self.overflow
            .swap(false, Ordering::AcqRel)
            .then(ChangeEvent::overflow)
    }
}

/// Maps one backend notification to change events.
///
/// Access events are ignored. A rescan flag becomes an overflow signal.
pub fn map_event(event: &Event, observed: DateTime<Utc>) -> Vec<ChangeEvent> {
    if event.need_rescan() {
        return vec![ChangeEvent::new(ChangeKind::Overflow, PathBuf::new(), observed)];
    }

    let each = |kind: ChangeKind| -> Vec<ChangeEvent> {
        event
            .paths
            .iter()
            .map(|path| ChangeEvent::new(kind.clone(), path.clone(), observed))
            .collect()
    };

    match event.kind {
        EventKind::Access(_) => Vec::new(),
        EventKind::Create(_) => each(ChangeKind::Created),
        EventKind::Remove(_) => each(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![ChangeEvent::new(
                ChangeKind::Renamed { from: from.clone() },
                to.clone(),
                observed,
            )],
            _ => each(ChangeKind::Modified),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(ChangeKind::Created),
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => each(ChangeKind::Modified),
    }
}

/// A recursive filesystem watcher on one root.
///
/// Dropping the source stops the watcher and closes its stream.
pub struct NotifySource {
    /// Keeps the backend alive.
    _watcher: RecommendedWatcher,
    /// Watched directory.
    root: PathBuf,
}

impl NotifySource {
    /// Starts watching `root` recursively, queueing at most `capacity` events.
    pub fn watch(root: &Path, capacity: usize) -> Result<(Self, EventStream), WatchError> {
        let (sender, stream) = EventStream::channel(capacity);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in map_event(&event, Utc::now()) {
                    sender.send(change);
                }
            }
            Err(e) => {
                warn!(error = %e, "watch backend error, forcing rescan");
                sender.mark_overflow();
            }
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        debug!(root = %root.display(), "watching");

        Ok((
            Self {
                _watcher: watcher,
                root: root.to_path_buf(),
            },
            stream,
        ))
    }

    /// Returns the watched root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
