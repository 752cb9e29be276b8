//! Keeping fdx indexes current under filesystem change.
//!
//! - [`NotifySource`] turns backend notifications into [`ChangeEvent`]s on a
//!   bounded [`EventStream`]
//! - [`Reconciler`] coalesces events and applies them to an index in batches
//! - [`WatchSession`] is the single writer task that drives a reconciler
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> Result<(), fdx_watch::WatchError> {
//! use fdx_index::{EntryScanner, IndexStore};
//! use fdx_watch::{NotifySource, Reconciler, WatchOptions, WatchSession};
//!
//! let root = std::path::Path::new("./docs");
//! let scanner = EntryScanner::new(Default::default(), Default::default());
//! let store = IndexStore::open("./index".as_ref())?;
//! let reconciler = Reconciler::new(root, scanner, store)?;
//!
//! let (_source, stream) = NotifySource::watch(reconciler.root(), 4096)?;
//! let session = WatchSession::spawn(reconciler, stream, WatchOptions::default());
//! tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//! session.stop().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod error;
mod event;
mod reconciler;
mod session;
mod source;

pub use error::WatchError;
pub use event::{ChangeEvent, ChangeKind, MutationKind, PendingMutation};
pub use reconciler::{
    BatchOutcome, DEFAULT_MAX_PENDING, ReconcileStats, Reconciler, ReconcilerState,
};
pub use session::{WatchOptions, WatchSession};
pub use source::{EventSender, EventStream, NotifySource, map_event};
