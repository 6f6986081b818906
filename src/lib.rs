//! # dirmirror - one-way directory mirroring over TCP
//!
//! A watcher on the source side turns file events into requests; a server on the
//! target side applies them. Modified files travel as fixed-size block diffs: the
//! client fetches the remote block hashes and sends only the blocks that differ.
//!
//! ## Serving a directory
//!
//! ```rust,ignore
//! use std::sync::atomic::AtomicBool;
//! use dirmirror::{config::Config, serve};
//!
//! let shutdown = AtomicBool::new(false);
//! serve::serve("./mirror".as_ref(), &Config::default(), &shutdown)?;
//! ```
//!
//! ## Pushing changes
//!
//! ```rust,ignore
//! use std::sync::{atomic::AtomicBool, Arc};
//! use dirmirror::{config::Config, dispatcher::SyncDispatcher};
//!
//! let dispatcher = SyncDispatcher::new("./source", &Config::default(), Arc::new(AtomicBool::new(false)))?;
//! let report = dispatcher.enumerate_and_reconcile()?;
//! println!("{} files uploaded", report.plan.upload.len());
//! ```

pub mod chunking;
pub mod config;
pub mod connect;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod logging;
pub mod protocol;
pub mod reconcile;
pub mod serve;
pub mod session;
pub mod types;
pub mod validation;
pub mod watch;

// Re-export commonly used types and functions
pub use config::Config;
pub use dispatcher::{FileEvent, SyncDispatcher};
pub use error::{ConnectionError, FileActionError, SyncError};
pub use protocol::{ActionCode, ActionRequest, ActionResponse, ProtocolError};
pub use types::{FileEntry, FileRecipe};

// vim: ts=4
