//! Configuration validation functions

use super::ValidationError;

/// Largest block size a peer may ask for (16 MiB)
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

/// Validate the diff block size
pub fn validate_block_size(block_size: usize) -> Result<(), ValidationError> {
	if block_size == 0 {
		return Err(ValidationError::ConfigError("block_size must be greater than 0".to_string()));
	}
	if block_size > MAX_BLOCK_SIZE {
		return Err(ValidationError::ConfigError(format!(
			"block_size must be at most {}, got {}",
			MAX_BLOCK_SIZE, block_size
		)));
	}
	Ok(())
}

/// Validate the TCP port
pub fn validate_port(port: u16) -> Result<(), ValidationError> {
	if port == 0 {
		return Err(ValidationError::ConfigError("port must be greater than 0".to_string()));
	}
	Ok(())
}

/// Validate the event loop wait budget in milliseconds
pub fn validate_poll_timeout_ms(timeout_ms: u64) -> Result<(), ValidationError> {
	if timeout_ms == 0 {
		return Err(ValidationError::ConfigError(
			"poll_timeout_ms must be greater than 0".to_string(),
		));
	}
	if timeout_ms > 60_000 {
		return Err(ValidationError::ConfigError(format!(
			"poll_timeout_ms too large: {} (max 60000)",
			timeout_ms
		)));
	}
	Ok(())
}

/// Validate the per-receive buffer size
pub fn validate_recv_buffer_size(size: usize) -> Result<(), ValidationError> {
	if size == 0 {
		return Err(ValidationError::ConfigError(
			"recv_buffer_size must be greater than 0".to_string(),
		));
	}
	Ok(())
}


// vim: ts=4
