//! Filesystem events for the client role
//!
//! Wraps a `notify` watcher on the top level of the mirrored directory and turns raw OS
//! events into `FileEvent`s, which are fed to the dispatcher one at a time.

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::dispatcher::{FileEvent, SyncDispatcher};
use crate::error::{ConnectionError, SyncError};
use crate::logging::*;

pub struct DirectoryWatcher {
	directory: PathBuf,
	rx: Receiver<notify::Result<Event>>,
	// Dropping the watcher stops event delivery
	_watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
	pub fn new(directory: &Path) -> Result<Self, SyncError> {
		let (tx, rx) = mpsc::channel();
		let mut watcher = notify::recommended_watcher(tx)?;
		watcher.watch(directory, RecursiveMode::NonRecursive)?;
		Ok(DirectoryWatcher { directory: directory.to_path_buf(), rx, _watcher: watcher })
	}

	pub fn directory(&self) -> &Path {
		&self.directory
	}

	/// Wait up to `timeout` for events, then drain whatever else is already queued
	pub fn next_batch(&self, timeout: Duration) -> Result<Vec<FileEvent>, SyncError> {
		let first = match self.rx.recv_timeout(timeout) {
			Ok(result) => result,
			Err(RecvTimeoutError::Timeout) => return Ok(Vec::new()),
			Err(RecvTimeoutError::Disconnected) => {
				return Err(SyncError::Watch { message: "event source disconnected".to_string() });
			}
		};

		let mut raw = Vec::new();
		for result in std::iter::once(first).chain(self.rx.try_iter()) {
			match result {
				Ok(event) => raw.push(event),
				Err(e) => warn!("Watcher error: {}", e),
			}
		}
		Ok(translate_batch(&raw))
	}
}

fn file_name(path: &Path) -> Option<String> {
	path.file_name().and_then(|n| n.to_str()).map(str::to_string)
}

/// A rename half waiting for its partner
struct RenameHalf {
	tracker: Option<usize>,
	name: String,
}

/// Map one batch of raw events to file events
///
/// Directories and metadata-only changes are ignored. Rename halves that are paired
/// by a combined rename event are dropped; an unpaired source half becomes a delete
/// (moved out of the directory) and an unpaired target half a create (moved in).
/// Consecutive duplicates are collapsed.
pub fn translate_batch(events: &[Event]) -> Vec<FileEvent> {
	let mut out = Vec::new();
	let mut from_halves: Vec<RenameHalf> = Vec::new();
	let mut to_halves: Vec<RenameHalf> = Vec::new();

	for event in events {
		let tracker = event.attrs.tracker();
		match &event.kind {
			EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {}
			EventKind::Create(_) => {
				for path in event.paths.iter().filter(|p| !p.is_dir()) {
					out.extend(file_name(path).map(FileEvent::Created));
				}
			}
			EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
				if let [from, to] = event.paths.as_slice() {
					if tracker.is_some() {
						from_halves.retain(|h| h.tracker != tracker);
						to_halves.retain(|h| h.tracker != tracker);
					}
					if to.is_dir() {
						continue;
					}
					if let (Some(from), Some(to)) = (file_name(from), file_name(to)) {
						out.push(FileEvent::Moved { from, to });
					}
				}
			}
			EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
				from_halves.extend(
					event.paths.iter().filter_map(|p| file_name(p)).map(|name| RenameHalf { tracker, name }),
				);
			}
			EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
				to_halves.extend(
					event
						.paths
						.iter()
						.filter(|p| !p.is_dir())
						.filter_map(|p| file_name(p))
						.map(|name| RenameHalf { tracker, name }),
				);
			}
			// Backends that cannot tell which side of a rename a path was on
			EventKind::Modify(ModifyKind::Name(_)) => {
				for path in &event.paths {
					let Some(name) = file_name(path) else { continue };
					if path.is_file() {
						out.push(FileEvent::Created(name));
					} else if !path.exists() {
						out.push(FileEvent::Deleted(name));
					}
				}
			}
			EventKind::Modify(ModifyKind::Metadata(_)) => {}
			EventKind::Modify(_) => {
				for path in event.paths.iter().filter(|p| p.is_file()) {
					out.extend(file_name(path).map(FileEvent::Modified));
				}
			}
			EventKind::Remove(_) => {
				for path in &event.paths {
					out.extend(file_name(path).map(FileEvent::Deleted));
				}
			}
			EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
		}
	}

	out.extend(from_halves.into_iter().map(|h| FileEvent::Deleted(h.name)));
	out.extend(to_halves.into_iter().map(|h| FileEvent::Created(h.name)));
	out.dedup();
	out
}

/// Mirror live changes until `shutdown` is raised
///
/// A failing event is logged and skipped; the next one is still dispatched.
pub fn run(dispatcher: &SyncDispatcher, poll_timeout: Duration, shutdown: &AtomicBool) -> Result<(), SyncError> {
	let watcher = DirectoryWatcher::new(dispatcher.directory())?;
	info!("Watching {}", watcher.directory().display());

	while !shutdown.load(Ordering::SeqCst) {
		for event in watcher.next_batch(poll_timeout)? {
			if shutdown.load(Ordering::SeqCst) {
				break;
			}
			match dispatcher.handle_event(&event) {
				Ok(_) => {}
				Err(SyncError::Connection(ConnectionError::Interrupted)) => break,
				Err(e) => error!("Mirroring {:?} failed: {}", event, e),
			}
		}
	}

	info!("Stopped watching {}", watcher.directory().display());
	Ok(())
}


// vim: ts=4
