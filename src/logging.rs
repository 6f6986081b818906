//! Logging prelude module for convenient access to tracing macros.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("accepted connection from {}", addr);
//! warn!("nothing to delete");
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (usually `Config::log_level`)
/// is used:
///
/// ```bash
/// RUST_LOG=debug dirmirror serve ./mirror
/// RUST_LOG=dirmirror::session=trace,dirmirror::serve=debug dirmirror serve ./mirror
/// ```
pub fn init_tracing(default_level: &str) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

	// A second init (tests, embedding) is not an error worth surfacing.
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

// vim: ts=4
