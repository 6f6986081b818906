//! Filesystem side of the action protocol
//!
//! `DirectoryActionHandler` applies decoded requests to one flat managed directory.
//! Business-rule violations come back as failure statuses; the connection that carried
//! the request is never torn down because of them.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::actions::{ActionCode, ActionRequest, ActionResponse, ActionStatus};
use crate::chunking;
use crate::error::FileActionError;
use crate::logging::*;
use crate::types::{FileEntry, FileRecipe, RawBlocks, HASH_ALGORITHM};
use crate::validation::{validate_block_size, validate_filename};

/// Something that turns one request into one response
///
/// Server sessions only see this trait, so they can be driven against a stub handler.
pub trait ActionHandler {
	fn handle(&self, request: ActionRequest) -> ActionResponse;
}

/// Applies actions to the files directly inside `directory`
#[derive(Debug, Clone)]
pub struct DirectoryActionHandler {
	directory: PathBuf,
	block_size: usize,
}

impl DirectoryActionHandler {
	/// Create a handler, creating `directory` (and its parents) when missing
	pub fn new(directory: impl Into<PathBuf>, block_size: usize) -> io::Result<Self> {
		let directory = directory.into();
		if !directory.exists() {
			debug!("The directory {} doesn't exist, creating it", directory.display());
			fs::create_dir_all(&directory)?;
		}
		Ok(DirectoryActionHandler { directory, block_size })
	}

	pub fn directory(&self) -> &Path {
		&self.directory
	}

	pub fn block_size(&self) -> usize {
		self.block_size
	}

	fn resolve(&self, filename: &str) -> Result<PathBuf, FileActionError> {
		validate_filename(filename).map_err(|e| FileActionError::InvalidFilename {
			filename: filename.to_string(),
			reason: e.to_string(),
		})?;
		Ok(self.directory.join(filename))
	}

	/// Create `filename` with `content`; never overwrites
	pub fn new_file(&self, filename: &str, content: &[u8]) -> Result<String, FileActionError> {
		let path = self.resolve(filename)?;
		let io_err = |source| FileActionError::Io { filename: filename.to_string(), source };

		debug!("creating file {}", path.display());
		let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
			Ok(f) => f,
			Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
				return Err(FileActionError::AlreadyExists { filename: filename.to_string() });
			}
			Err(e) => return Err(io_err(e)),
		};
		file.write_all(content).map_err(io_err)?;

		Ok(format!("Successfully uploaded {}", filename))
	}

	/// Rename `source` to `destination`; both must be plain filenames
	pub fn move_file(&self, source: &str, destination: &str) -> Result<String, FileActionError> {
		let src_path = self.resolve(source)?;
		let dest_path = self.resolve(destination)?;

		if !src_path.exists() {
			return Err(FileActionError::NotFound { filename: source.to_string() });
		}
		if dest_path.exists() {
			return Err(FileActionError::DestinationExists {
				source: source.to_string(),
				destination: destination.to_string(),
			});
		}

		fs::rename(&src_path, &dest_path)
			.map_err(|source_err| FileActionError::Io { filename: source.to_string(), source: source_err })?;

		Ok(format!("Successfully moved file {} to {}", source, destination))
	}

	/// Remove `filename`; a missing file is reported but is not a failure
	pub fn delete_file(&self, filename: &str) -> Result<String, FileActionError> {
		let path = self.resolve(filename)?;

		match fs::remove_file(&path) {
			Ok(()) => Ok(format!("Successfully deleted {}", filename)),
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				warn!("Filename {} doesn't exist, nothing to delete", filename);
				Ok(format!("Filename {} doesn't exist, nothing to delete", filename))
			}
			Err(e) => Err(FileActionError::Io { filename: filename.to_string(), source: e }),
		}
	}

	/// Current listing of the managed directory
	pub fn enumerate(&self) -> io::Result<Vec<FileEntry>> {
		chunking::enumerate_directory(&self.directory, self.block_size)
	}

	/// Block hashes of `filename` at the handler's block size
	pub fn file_recipe(&self, filename: &str) -> Result<FileRecipe, FileActionError> {
		let path = self.resolve(filename)?;
		if !path.is_file() {
			return Err(FileActionError::NotFound { filename: filename.to_string() });
		}

		let recipe = chunking::hashed_blocks(&path, self.block_size)
			.map_err(|source| FileActionError::Io { filename: filename.to_string(), source })?;

		Ok(FileRecipe {
			filename: filename.to_string(),
			block_size: self.block_size,
			hash_algorithm: HASH_ALGORITHM.to_string(),
			recipe,
		})
	}

	/// Overlay `blocks` onto the existing `filename` and rewrite it
	///
	/// Blocks past the end of the incoming set are kept, so a shrunken source leaves its
	/// old tail in place.
	pub fn update_file(
		&self,
		filename: &str,
		block_size: usize,
		blocks: RawBlocks,
	) -> Result<String, FileActionError> {
		let path = self.resolve(filename)?;
		let io_err = |source| FileActionError::Io { filename: filename.to_string(), source };
		validate_block_size(block_size)
			.map_err(|e| FileActionError::InvalidBlockSize { block_size, reason: e.to_string() })?;

		if !path.is_file() {
			return Err(FileActionError::NotFound { filename: filename.to_string() });
		}

		let current = chunking::raw_blocks(&path, block_size).map_err(io_err)?;
		let updated = blocks.len();
		let merged = chunking::overlay_blocks(current, blocks);
		chunking::materialize(&path, &merged).map_err(io_err)?;

		debug!("Updated {} of {} blocks in {}", updated, merged.len(), filename);
		Ok(format!("Successfully updated {}", filename))
	}

	fn status(action: ActionCode, result: Result<String, FileActionError>) -> ActionResponse {
		match result {
			Ok(msg) => ActionResponse::Status(ActionStatus::ok(action, msg)),
			Err(e) => {
				error!("{} failed: {}", action.name(), e);
				ActionResponse::Status(ActionStatus::failed(action, e.to_string()))
			}
		}
	}
}

impl ActionHandler for DirectoryActionHandler {
	fn handle(&self, request: ActionRequest) -> ActionResponse {
		let action = request.code();
		match request {
			ActionRequest::EnumerateDirectory => match self.enumerate() {
				Ok(files) => {
					info!("Successfully enumerated {} ({} files)", self.directory.display(), files.len());
					ActionResponse::Listing { block_size: self.block_size, files }
				}
				Err(e) => {
					error!("Cannot enumerate {}: {}", self.directory.display(), e);
					ActionResponse::Status(ActionStatus::failed(action, e.to_string()))
				}
			},
			ActionRequest::NewFile { filename, content } => {
				Self::status(action, self.new_file(&filename, &content))
			}
			ActionRequest::MoveFile { source, destination } => {
				Self::status(action, self.move_file(&source, &destination))
			}
			ActionRequest::DeleteFile { filename } => Self::status(action, self.delete_file(&filename)),
			ActionRequest::FileRecipe { filename } => match self.file_recipe(&filename) {
				Ok(recipe) => {
					info!("Successfully created file recipe for {}", filename);
					ActionResponse::Recipe(recipe)
				}
				Err(e) => Self::status(action, Err(e)),
			},
			ActionRequest::UpdateFile { filename, block_size, blocks } => {
				Self::status(action, self.update_file(&filename, block_size, blocks))
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn handler(dir: &TempDir) -> DirectoryActionHandler {
		DirectoryActionHandler::new(dir.path(), 4).unwrap()
	}

	#[test]
	fn test_new_creates_missing_directory() {
		let dir = TempDir::new().unwrap();
		let nested = dir.path().join("a").join("b");
		let h = DirectoryActionHandler::new(&nested, 4).unwrap();
		assert!(nested.is_dir());
		assert_eq!(h.directory(), nested.as_path());
	}

	#[test]
	fn test_new_file_never_overwrites() {
		let dir = TempDir::new().unwrap();
		let h = handler(&dir);
		assert!(h.new_file("a.txt", b"first").is_ok());
		assert!(matches!(h.new_file("a.txt", b"second"), Err(FileActionError::AlreadyExists { .. })));
		assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"first");
	}

	#[test]
	fn test_move_file_rules() {
		let dir = TempDir::new().unwrap();
		let h = handler(&dir);
		assert!(matches!(h.move_file("nope", "x"), Err(FileActionError::NotFound { .. })));

		h.new_file("a", b"a").unwrap();
		h.new_file("b", b"b").unwrap();
		assert!(matches!(h.move_file("a", "b"), Err(FileActionError::DestinationExists { .. })));

		h.move_file("a", "c").unwrap();
		assert!(!dir.path().join("a").exists());
		assert_eq!(fs::read(dir.path().join("c")).unwrap(), b"a");
	}

	#[test]
	fn test_delete_missing_is_not_an_error() {
		let dir = TempDir::new().unwrap();
		let msg = handler(&dir).delete_file("missing.txt").unwrap();
		assert!(msg.contains("nothing to delete"));
	}

	#[test]
	fn test_update_overlays_and_keeps_tail() {
		let dir = TempDir::new().unwrap();
		let h = handler(&dir);
		h.new_file("f", b"aaaabbbbcc").unwrap();

		let blocks: RawBlocks = [(1, b"XXXX".to_vec())].into_iter().collect();
		h.update_file("f", 4, blocks).unwrap();
		assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"aaaaXXXXcc");
	}

	#[test]
	fn test_update_never_creates() {
		let dir = TempDir::new().unwrap();
		let result = handler(&dir).update_file("ghost", 4, RawBlocks::new());
		assert!(matches!(result, Err(FileActionError::NotFound { .. })));
		assert!(!dir.path().join("ghost").exists());
	}

	#[test]
	fn test_update_rejects_unusable_block_size() {
		let dir = TempDir::new().unwrap();
		let h = handler(&dir);
		h.new_file("f", b"aaaabbbb").unwrap();

		for block_size in [0, usize::MAX] {
			let response = h.handle(ActionRequest::UpdateFile {
				filename: "f".to_string(),
				block_size,
				blocks: [(0, b"XXXX".to_vec())].into_iter().collect(),
			});
			assert!(!response.is_success());
		}
		assert!(matches!(
			h.update_file("f", 0, RawBlocks::new()),
			Err(FileActionError::InvalidBlockSize { block_size: 0, .. })
		));
		assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"aaaabbbb");
	}

	#[test]
	fn test_traversal_rejected() {
		let dir = TempDir::new().unwrap();
		let h = handler(&dir);
		assert!(matches!(h.new_file("../escape", b"x"), Err(FileActionError::InvalidFilename { .. })));
		assert!(matches!(h.delete_file("/etc/passwd"), Err(FileActionError::InvalidFilename { .. })));
	}

	#[test]
	fn test_handle_recipe_for_missing_file_is_failure_status() {
		let dir = TempDir::new().unwrap();
		let resp = handler(&dir).handle(ActionRequest::FileRecipe { filename: "none".to_string() });
		assert_eq!(resp.action(), ActionCode::FileRecipe);
		assert!(!resp.is_success());
	}

	#[test]
	fn test_handle_enumerate_reports_block_size() {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join("x"), b"12345").unwrap();
		match handler(&dir).handle(ActionRequest::EnumerateDirectory) {
			ActionResponse::Listing { block_size, files } => {
				assert_eq!(block_size, 4);
				assert_eq!(files.len(), 1);
				assert_eq!(files[0].file_size, 5);
			}
			other => panic!("unexpected response {:?}", other),
		}
	}
}

// vim: ts=4
