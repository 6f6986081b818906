//! First-contact reconciliation
//!
//! The local directory is authoritative: files only the remote has are deleted there,
//! never pulled down.

use std::collections::BTreeMap;

use crate::types::FileEntry;

/// Every filename seen on either side, in exactly one bucket, each bucket sorted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
	/// Identical `(filename, size, hash)` on both sides
	pub same: Vec<String>,
	/// Present on both sides with different size or hash
	pub update: Vec<String>,
	/// Only on the remote side
	pub delete_remote: Vec<String>,
	/// Only on the local side
	pub upload: Vec<String>,
}

impl Reconciliation {
	/// Number of requests needed to bring the remote in line
	pub fn pending_actions(&self) -> usize {
		self.update.len() + self.delete_remote.len() + self.upload.len()
	}

	pub fn is_in_sync(&self) -> bool {
		self.pending_actions() == 0
	}
}

/// Classify both listings (computed at the same block size) by filename
pub fn reconcile(local: &[FileEntry], remote: &[FileEntry]) -> Reconciliation {
	let local: BTreeMap<&str, &FileEntry> = local.iter().map(|e| (e.filename.as_str(), e)).collect();
	let remote: BTreeMap<&str, &FileEntry> = remote.iter().map(|e| (e.filename.as_str(), e)).collect();

	let mut result = Reconciliation::default();

	for (name, local_entry) in &local {
		match remote.get(name) {
			Some(remote_entry) if remote_entry == local_entry => result.same.push(name.to_string()),
			Some(_) => result.update.push(name.to_string()),
			None => result.upload.push(name.to_string()),
		}
	}
	result.delete_remote =
		remote.keys().filter(|name| !local.contains_key(*name)).map(|name| name.to_string()).collect();

	result
}


// vim: ts=4
