//! Configuration for both roles
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (`Config::default()`)
//! 2. Config file (`--config path/to/dirmirror.toml`)
//! 3. Environment variables (`DIRMIRROR_*` prefix)
//! 4. CLI flags (highest priority, applied by the binary)
//!
//! The resulting value is handed to the dispatcher and the server explicitly.

use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use std::{env, fs};

use crate::error::SyncError;
use crate::validation;

/// 64 KiB, the block size used when nothing else is configured
pub const DEFAULT_BLOCK_SIZE: usize = 0x10000;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 50001;

/// Runtime configuration shared by the client and the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// Host the server binds to and the client connects to
	pub host: String,

	/// TCP port
	pub port: u16,

	/// Block size used for listings, recipes and diffs
	pub block_size: usize,

	/// Upper bound on a single multiplexer wait, for shutdown responsiveness
	pub poll_timeout_ms: u64,

	/// Maximum bytes taken by one receive attempt
	pub recv_buffer_size: usize,

	/// Default log filter when `RUST_LOG` is unset
	pub log_level: String,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			host: DEFAULT_HOST.to_string(),
			port: DEFAULT_PORT,
			block_size: DEFAULT_BLOCK_SIZE,
			poll_timeout_ms: 1000,
			recv_buffer_size: 4096,
			log_level: "info".to_string(),
		}
	}
}

impl Config {
	/// Build a configuration from defaults, an optional TOML file and the environment
	pub fn load(path: Option<&Path>) -> Result<Config, SyncError> {
		let mut config = match path {
			Some(path) => Config::from_file(path)?,
			None => Config::default(),
		};
		config.apply_env(|key| env::var(key).ok())?;
		Ok(config)
	}

	/// Parse a TOML config file; missing keys keep their defaults
	pub fn from_file(path: &Path) -> Result<Config, SyncError> {
		let text = fs::read_to_string(path).map_err(|e| SyncError::InvalidConfig {
			message: format!("Cannot read {}: {}", path.display(), e),
		})?;
		toml::from_str(&text).map_err(|e| SyncError::InvalidConfig {
			message: format!("Cannot parse {}: {}", path.display(), e),
		})
	}

	/// Apply `DIRMIRROR_*` overrides through a lookup function
	///
	/// Takes the lookup as a parameter so tests need not touch the process environment.
	pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SyncError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(host) = lookup("DIRMIRROR_HOST") {
			self.host = host;
		}
		if let Some(port) = lookup("DIRMIRROR_PORT") {
			self.port = parse_env("DIRMIRROR_PORT", &port)?;
		}
		if let Some(block_size) = lookup("DIRMIRROR_BLOCK_SIZE") {
			self.block_size = parse_env("DIRMIRROR_BLOCK_SIZE", &block_size)?;
		}
		if let Some(timeout) = lookup("DIRMIRROR_POLL_TIMEOUT_MS") {
			self.poll_timeout_ms = parse_env("DIRMIRROR_POLL_TIMEOUT_MS", &timeout)?;
		}
		Ok(())
	}

	/// Validate the configuration
	pub fn validate(&self) -> Result<(), SyncError> {
		validation::validate_block_size(self.block_size)
			.and_then(|_| validation::validate_port(self.port))
			.and_then(|_| validation::validate_poll_timeout_ms(self.poll_timeout_ms))
			.and_then(|_| validation::validate_recv_buffer_size(self.recv_buffer_size))
			.map_err(|e| SyncError::InvalidConfig { message: e.to_string() })
	}

	/// Resolve `host:port` to a socket address
	pub fn socket_addr(&self) -> Result<SocketAddr, SyncError> {
		(self.host.as_str(), self.port)
			.to_socket_addrs()?
			.next()
			.ok_or_else(|| SyncError::InvalidConfig {
				message: format!("{}:{} does not resolve to an address", self.host, self.port),
			})
	}

	pub fn poll_timeout(&self) -> Duration {
		Duration::from_millis(self.poll_timeout_ms)
	}
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SyncError> {
	value.trim().parse::<T>().map_err(|_| SyncError::InvalidConfig {
		message: format!("{} has an invalid value: {:?}", key, value),
	})
}


// vim: ts=4
