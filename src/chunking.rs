//! Fixed-size block codec
//!
//! Files are cut into `block_size` pieces at fixed offsets; only the last piece may be
//! shorter. Blocks are numbered densely from 0.
//!
//! Chunking is offset-based, not content-defined. An insertion or deletion whose
//! length is not a multiple of `block_size` shifts every later boundary, so every hash
//! after the edit point changes even though most of the bytes did not. Only in-place
//! edits diff well.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::logging::*;
use crate::types::{BlockHashes, FileBlock, FileEntry, RawBlocks};

/// Upper bound on the up-front allocation for one block; larger blocks grow as read
const BLOCK_PREALLOC: usize = 64 * 1024;

/// Iterator over the fixed-size blocks of a reader
pub struct BlockReader<R> {
	reader: R,
	block_size: usize,
	next_index: u64,
	done: bool,
}

impl<R: Read> BlockReader<R> {
	pub fn new(reader: R, block_size: usize) -> Self {
		BlockReader { reader, block_size, next_index: 0, done: block_size == 0 }
	}
}

impl<R: Read> Iterator for BlockReader<R> {
	type Item = io::Result<FileBlock>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done {
			return None;
		}

		let mut data = Vec::with_capacity(self.block_size.min(BLOCK_PREALLOC));
		match (&mut self.reader).take(self.block_size as u64).read_to_end(&mut data) {
			Ok(0) => {
				self.done = true;
				None
			}
			Ok(n) => {
				// A short read through `take` only happens at EOF
				if n < self.block_size {
					self.done = true;
				}
				let block = FileBlock { index: self.next_index, data };
				self.next_index += 1;
				Some(Ok(block))
			}
			Err(e) => {
				self.done = true;
				Some(Err(e))
			}
		}
	}
}

/// Open `path` for block-wise reading
pub fn open_blocks(path: &Path, block_size: usize) -> io::Result<BlockReader<BufReader<fs::File>>> {
	if block_size == 0 {
		return Err(io::Error::new(io::ErrorKind::InvalidInput, "block size must be non-zero"));
	}
	let file = fs::File::open(path)?;
	Ok(BlockReader::new(BufReader::new(file), block_size))
}

/// SHA-256 of the whole file, fed one block at a time
pub fn whole_file_hash(path: &Path, block_size: usize) -> io::Result<String> {
	let mut hasher = Sha256::new();
	for block in open_blocks(path, block_size)? {
		hasher.update(&block?.data);
	}
	Ok(hex::encode(hasher.finalize()))
}

/// One independent hash per block
pub fn hashed_blocks(path: &Path, block_size: usize) -> io::Result<BlockHashes> {
	open_blocks(path, block_size)?
		.map(|block| block.map(|b| (b.index, b.hash())))
		.collect()
}

/// Raw bytes per block
pub fn raw_blocks(path: &Path, block_size: usize) -> io::Result<RawBlocks> {
	open_blocks(path, block_size)?.map(|block| block.map(|b| (b.index, b.data))).collect()
}

/// Rewrite `path` from `blocks` in ascending index order
///
/// The caller guarantees the indices are contiguous from 0; gaps are not detected and
/// simply produce a shorter file.
pub fn materialize(path: &Path, blocks: &RawBlocks) -> io::Result<()> {
	let mut writer = BufWriter::new(fs::File::create(path)?);
	for data in blocks.values() {
		writer.write_all(data)?;
	}
	writer.flush()
}

/// Indices whose `(index, hash)` pair exists locally but not remotely
///
/// Covers both edited blocks and blocks past the end of the remote file. Blocks that
/// only exist remotely (the local file shrank) are never reported.
pub fn changed_blocks(local: &BlockHashes, remote: &BlockHashes) -> BTreeSet<u64> {
	local
		.iter()
		.filter(|(index, hash)| remote.get(*index) != Some(*hash))
		.map(|(index, _)| *index)
		.collect()
}

/// Merge `incoming` over `base`; incoming blocks win
pub fn overlay_blocks(mut base: RawBlocks, incoming: RawBlocks) -> RawBlocks {
	base.extend(incoming);
	base
}

/// Result of hashing every regular file directly inside a directory
#[derive(Debug, Default)]
pub struct DirectoryScan {
	/// Hashed files, sorted by filename
	pub files: Vec<FileEntry>,
	/// Names present in the directory that could not be stat'ed or hashed
	pub unreadable: Vec<String>,
}

/// List the regular files directly inside `dir`, sorted by filename
///
/// Subdirectories are not traversed. Entries whose names are not valid UTF-8 are
/// skipped; entries that cannot be stat'ed or hashed are reported as unreadable.
pub fn scan_directory(dir: &Path, block_size: usize) -> io::Result<DirectoryScan> {
	let mut scan = DirectoryScan::default();

	for entry_result in fs::read_dir(dir)? {
		let entry = match entry_result {
			Ok(e) => e,
			Err(e) => {
				debug!("Error reading directory entry: {}", e);
				continue;
			}
		};

		let filename = match entry.file_name().into_string() {
			Ok(name) => name,
			Err(name) => {
				warn!("Skipping non UTF-8 filename {:?}", name);
				continue;
			}
		};

		let path = entry.path();
		let meta = match fs::metadata(&path) {
			Ok(m) => m,
			Err(e) => {
				warn!("Cannot access {}: {}", path.display(), e);
				scan.unreadable.push(filename);
				continue;
			}
		};
		if !meta.is_file() {
			continue;
		}

		match whole_file_hash(&path, block_size) {
			Ok(sha256) => scan.files.push(FileEntry { filename, file_size: meta.len(), sha256 }),
			Err(e) => {
				warn!("Cannot hash {}: {}", path.display(), e);
				scan.unreadable.push(filename);
			}
		}
	}

	scan.files.sort();
	scan.unreadable.sort();
	Ok(scan)
}

/// The hashed files of [`scan_directory`]
pub fn enumerate_directory(dir: &Path, block_size: usize) -> io::Result<Vec<FileEntry>> {
	Ok(scan_directory(dir, block_size)?.files)
}


// vim: ts=4
