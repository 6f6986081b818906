use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Hash algorithm id carried in recipes
pub const HASH_ALGORITHM: &str = "sha256";

/// Block index → hex digest, ascending
pub type BlockHashes = BTreeMap<u64, String>;

/// Block index → raw bytes, ascending
pub type RawBlocks = BTreeMap<u64, Vec<u8>>;

/// One fixed-size slice of a file; only the last block of a file may be shorter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock {
	pub index: u64,
	pub data: Vec<u8>,
}

impl FileBlock {
	/// Hex SHA-256 of the block contents
	pub fn hash(&self) -> String {
		hex::encode(Sha256::digest(&self.data))
	}
}

/// Block-hash fingerprint of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecipe {
	pub filename: String,
	pub block_size: usize,
	pub hash_algorithm: String,
	pub recipe: BlockHashes,
}

/// One row of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileEntry {
	pub filename: String,
	pub file_size: u64,
	pub sha256: String,
}
