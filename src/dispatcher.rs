//! Client role: turns file events into protocol exchanges
//!
//! Requests are issued strictly one at a time. Each call opens its own connection and
//! returns the final response of the exchange (or of the chain, for updates).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::chunking;
use crate::config::Config;
use crate::connect::{self, ExchangeOptions};
use crate::error::{ConnectionError, SyncError};
use crate::logging::*;
use crate::protocol::{ActionCode, ActionRequest, ActionResponse, ActionStatus, ProtocolError};
use crate::reconcile::{self, Reconciliation};
use crate::types::RawBlocks;
use crate::validation::validate_block_size;

/// A change observed in the watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
	Created(String),
	Modified(String),
	Moved { from: String, to: String },
	Deleted(String),
}

/// Outcome of the start-up reconciliation
#[derive(Debug, Default)]
pub struct ReconcileReport {
	pub plan: Reconciliation,
	/// Files whose request failed, either as a failure status or with an error
	pub failed: Vec<String>,
	/// Local files that could not be read; their remote copies are left alone
	pub unreadable: Vec<String>,
}

pub struct SyncDispatcher {
	directory: PathBuf,
	addr: SocketAddr,
	block_size: usize,
	options: ExchangeOptions,
	shutdown: Arc<AtomicBool>,
}

impl SyncDispatcher {
	/// Resolve the server address once; every request reuses it
	pub fn new(directory: impl Into<PathBuf>, config: &Config, shutdown: Arc<AtomicBool>) -> Result<Self, SyncError> {
		Ok(SyncDispatcher {
			directory: directory.into(),
			addr: config.socket_addr()?,
			block_size: config.block_size,
			options: ExchangeOptions {
				poll_timeout: config.poll_timeout(),
				recv_buffer_size: config.recv_buffer_size,
			},
			shutdown,
		})
	}

	pub fn directory(&self) -> &Path {
		&self.directory
	}

	fn exchange(&self, request: &ActionRequest) -> Result<ActionResponse, SyncError> {
		let response = connect::exchange(self.addr, request, self.options, &self.shutdown)?;
		match &response {
			ActionResponse::Status(status) if status.success => info!("{}", status.msg),
			ActionResponse::Status(status) => warn!("{} failed: {}", status.action.name(), status.msg),
			_ => debug!("{} response received", response.action()),
		}
		Ok(response)
	}

	/// Map one event to its request(s)
	pub fn handle_event(&self, event: &FileEvent) -> Result<ActionResponse, SyncError> {
		debug!("Dispatching {:?}", event);
		match event {
			FileEvent::Created(filename) => self.new_file(filename),
			FileEvent::Modified(filename) => self.update_file(filename),
			FileEvent::Moved { from, to } => self.move_file(from, to),
			FileEvent::Deleted(filename) => self.delete_file(filename),
		}
	}

	/// Upload a file the remote does not have yet
	///
	/// An unreadable local file is sent with empty content.
	pub fn new_file(&self, filename: &str) -> Result<ActionResponse, SyncError> {
		let content = match std::fs::read(self.directory.join(filename)) {
			Ok(content) => content,
			Err(e) => {
				warn!("Cannot read {}, uploading it empty: {}", filename, e);
				Vec::new()
			}
		};
		self.exchange(&ActionRequest::NewFile { filename: filename.to_string(), content })
	}

	pub fn move_file(&self, from: &str, to: &str) -> Result<ActionResponse, SyncError> {
		self.exchange(&ActionRequest::MoveFile { source: from.to_string(), destination: to.to_string() })
	}

	pub fn delete_file(&self, filename: &str) -> Result<ActionResponse, SyncError> {
		self.exchange(&ActionRequest::DeleteFile { filename: filename.to_string() })
	}

	/// Fetch the remote recipe, then send only the blocks that differ
	pub fn update_file(&self, filename: &str) -> Result<ActionResponse, SyncError> {
		let recipe = match self.exchange(&ActionRequest::FileRecipe { filename: filename.to_string() })? {
			ActionResponse::Recipe(recipe) => recipe,
			// Failure status from the remote ends the chain here
			other @ ActionResponse::Status(_) => return Ok(other),
			other => {
				return Err(ProtocolError::InvalidPayload(format!(
					"unexpected {} response to a recipe request",
					other.action()
				))
				.into());
			}
		};

		validate_block_size(recipe.block_size).map_err(|e| {
			ProtocolError::InvalidPayload(format!("recipe for {} has an unusable block size: {}", filename, e))
		})?;

		let path = self.directory.join(filename);
		let local = chunking::hashed_blocks(&path, recipe.block_size)?;
		let changed = chunking::changed_blocks(&local, &recipe.recipe);
		if changed.is_empty() {
			info!("{} is already up to date", filename);
			return Ok(ActionResponse::Status(ActionStatus::ok(
				ActionCode::UpdateFile,
				format!("{} is already up to date", filename),
			)));
		}

		let blocks: RawBlocks = chunking::raw_blocks(&path, recipe.block_size)?
			.into_iter()
			.filter(|(index, _)| changed.contains(index))
			.collect();
		debug!("Sending {} of {} blocks of {}", blocks.len(), local.len(), filename);

		self.exchange(&ActionRequest::UpdateFile {
			filename: filename.to_string(),
			block_size: recipe.block_size,
			blocks,
		})
	}

	/// Fetch the remote listing, diff it against the local directory and apply the plan
	pub fn enumerate_and_reconcile(&self) -> Result<ReconcileReport, SyncError> {
		let (block_size, remote) = match self.exchange(&ActionRequest::EnumerateDirectory)? {
			ActionResponse::Listing { block_size, files } => (block_size, files),
			ActionResponse::Status(status) => {
				return Err(SyncError::Other {
					message: format!("Remote enumeration failed: {}", status.msg),
				});
			}
			other => {
				return Err(ProtocolError::InvalidPayload(format!(
					"unexpected {} response to an enumeration",
					other.action()
				))
				.into());
			}
		};

		// Compare at the remote's block size; fall back to ours if it sent nonsense
		let block_size = match validate_block_size(block_size) {
			Ok(()) => block_size,
			Err(e) => {
				warn!("Ignoring remote block size: {}", e);
				self.block_size
			}
		};
		let scan = chunking::scan_directory(&self.directory, block_size)?;
		let mut plan = reconcile::reconcile(&scan.files, &remote);
		plan.delete_remote.retain(|filename| {
			let readable = scan.unreadable.binary_search(filename).is_err();
			if !readable {
				warn!("Keeping remote copy of {}, the local file cannot be read", filename);
			}
			readable
		});
		info!(
			"Reconciled: {} same, {} to update, {} to delete remotely, {} to upload ({} requests)",
			plan.same.len(),
			plan.update.len(),
			plan.delete_remote.len(),
			plan.upload.len(),
			plan.pending_actions()
		);
		if plan.is_in_sync() {
			info!("Remote already mirrors {}", self.directory.display());
		}

		let outcomes = plan.update.iter().map(|f| (f, self.update_file(f)))
			.chain(plan.delete_remote.iter().map(|f| (f, self.delete_file(f))))
			.chain(plan.upload.iter().map(|f| (f, self.new_file(f))));

		let mut failed = Vec::new();
		for (filename, outcome) in outcomes {
			match outcome {
				Ok(response) if response.is_success() => {}
				Ok(_) => failed.push(filename.clone()),
				Err(e @ SyncError::Connection(ConnectionError::Interrupted)) => return Err(e),
				Err(e) => {
					error!("Cannot sync {}: {}", filename, e);
					failed.push(filename.clone());
				}
			}
		}

		Ok(ReconcileReport { plan, failed, unreadable: scan.unreadable })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_new_resolves_address() {
		let config = Config { host: "127.0.0.1".to_string(), port: 6123, ..Config::default() };
		let d = SyncDispatcher::new("/tmp", &config, Arc::new(AtomicBool::new(false))).unwrap();
		assert_eq!(d.addr.port(), 6123);
		assert_eq!(d.directory(), Path::new("/tmp"));
	}
}

// vim: ts=4
