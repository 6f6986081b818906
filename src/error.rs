//! Error types for dirmirror operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::protocol::ProtocolError;

/// Main error type for the dispatcher and the binary
#[derive(Debug)]
pub enum SyncError {
	/// I/O error
	Io(io::Error),

	/// Connection error (nested)
	Connection(ConnectionError),

	/// File action error (nested)
	FileAction(FileActionError),

	/// Invalid configuration
	InvalidConfig { message: String },

	/// Directory argument is missing or not a directory
	InvalidDirectory { path: String, message: String },

	/// Filesystem watcher failure
	Watch { message: String },

	/// Generic error message
	Other { message: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::Connection(e) => write!(f, "Connection error: {}", e),
			SyncError::FileAction(e) => write!(f, "File action error: {}", e),
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::InvalidDirectory { path, message } => {
				write!(f, "Invalid directory {}: {}", path, message)
			}
			SyncError::Watch { message } => write!(f, "Watcher error: {}", message),
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<String> for SyncError {
	fn from(e: String) -> Self {
		SyncError::Other { message: e }
	}
}

impl From<ConnectionError> for SyncError {
	fn from(e: ConnectionError) -> Self {
		SyncError::Connection(e)
	}
}

impl From<ProtocolError> for SyncError {
	fn from(e: ProtocolError) -> Self {
		SyncError::Connection(ConnectionError::Protocol(e))
	}
}

impl From<FileActionError> for SyncError {
	fn from(e: FileActionError) -> Self {
		SyncError::FileAction(e)
	}
}

impl From<notify::Error> for SyncError {
	fn from(e: notify::Error) -> Self {
		SyncError::Watch { message: e.to_string() }
	}
}

/// Per-connection failures. The event loop closes the offending connection
/// and keeps serving the others.
#[derive(Debug)]
pub enum ConnectionError {
	/// Peer closed the socket before the exchange completed
	PeerClosed { address: String },

	/// Malformed frame, header or payload
	Protocol(ProtocolError),

	/// Socket I/O failure
	Io(io::Error),

	/// Could not establish the connection
	ConnectFailed { address: String, source: io::Error },

	/// Shutdown was requested while the exchange was in flight
	Interrupted,
}

impl fmt::Display for ConnectionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnectionError::PeerClosed { address } => write!(f, "Peer {} has closed", address),
			ConnectionError::Protocol(e) => write!(f, "Protocol error: {}", e),
			ConnectionError::Io(e) => write!(f, "Socket error: {}", e),
			ConnectionError::ConnectFailed { address, source } => {
				write!(f, "Failed to connect to {}: {}", address, source)
			}
			ConnectionError::Interrupted => write!(f, "Interrupted by shutdown"),
		}
	}
}

impl Error for ConnectionError {}

impl From<io::Error> for ConnectionError {
	fn from(e: io::Error) -> Self {
		ConnectionError::Io(e)
	}
}

impl From<ProtocolError> for ConnectionError {
	fn from(e: ProtocolError) -> Self {
		ConnectionError::Protocol(e)
	}
}

/// Business-rule violations of a single file action. The server turns these into
/// failure responses instead of dropping the connection.
#[derive(Debug)]
pub enum FileActionError {
	/// New file would overwrite an existing one
	AlreadyExists { filename: String },

	/// Target of the action does not exist
	NotFound { filename: String },

	/// Move destination is already taken
	DestinationExists { source: String, destination: String },

	/// Filename is not a single plain path component
	InvalidFilename { filename: String, reason: String },

	/// Block size in the request is zero or too large to apply
	InvalidBlockSize { block_size: usize, reason: String },

	/// Filesystem failure while applying the action
	Io { filename: String, source: io::Error },
}

impl fmt::Display for FileActionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FileActionError::AlreadyExists { filename } => {
				write!(f, "Filename {} already exists, cannot save as new", filename)
			}
			FileActionError::NotFound { filename } => {
				write!(f, "The file {} doesn't exist", filename)
			}
			FileActionError::DestinationExists { source, destination } => write!(
				f,
				"The destination file {} already exists, {} cannot be renamed to it",
				destination, source
			),
			FileActionError::InvalidFilename { filename, reason } => {
				write!(f, "Invalid filename {:?}: {}", filename, reason)
			}
			FileActionError::InvalidBlockSize { block_size, reason } => {
				write!(f, "Invalid block size {}: {}", block_size, reason)
			}
			FileActionError::Io { filename, source } => {
				write!(f, "I/O error on {}: {}", filename, source)
			}
		}
	}
}

impl Error for FileActionError {}


// vim: ts=4
