//! Filename validation
//!
//! The mirror is flat: every filename on the wire must name a direct child of the
//! managed directory.

use std::path::{Component, Path};

use super::ValidationError;

/// Check that `name` is exactly one normal path component
///
/// Rejects empty names, `.`/`..`, absolute paths, anything containing a
/// separator, and NUL bytes.
pub fn is_plain_filename(name: &str) -> bool {
	if name.is_empty() || name.contains('\0') || name.contains('/') || name.contains('\\') {
		return false;
	}
	let mut components = Path::new(name).components();
	matches!((components.next(), components.next()), (Some(Component::Normal(_)), None))
}

/// Validate a filename received from a peer
///
/// # Returns
/// `Ok(())` if valid, `Err(ValidationError)` describing why it is not
pub fn validate_filename(name: &str) -> Result<(), ValidationError> {
	if name.is_empty() {
		return Err(ValidationError::PathError("Filename is empty".to_string()));
	}
	if name.contains('\0') {
		return Err(ValidationError::PathError("Filename contains NUL byte".to_string()));
	}
	if !is_plain_filename(name) {
		return Err(ValidationError::PathError(format!(
			"Filename {:?} must be a single path component",
			name
		)));
	}
	Ok(())
}

/// Check that `path` names an existing directory
pub fn validate_directory(path: &Path) -> Result<(), ValidationError> {
	match std::fs::metadata(path) {
		Ok(meta) if meta.is_dir() => Ok(()),
		Ok(_) => Err(ValidationError::PathError(format!("{} is not a directory", path.display()))),
		Err(e) => Err(ValidationError::PathError(format!("{} is not accessible: {}", path.display(), e))),
	}
}


// vim: ts=4
