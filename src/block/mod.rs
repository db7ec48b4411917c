//! Block records: per-(disk, block index) metadata the sync driver reads
//! and mutates in place.

pub mod iterator;

use std::path::PathBuf;
use std::sync::Arc;

/// Fixed-output digest stored per block. Sized for BLAKE3's 32-byte output;
/// a 16-byte algorithm would simply leave the tail zeroed.
pub const HASH_SIZE: usize = 32;

/// The file a block belongs to, plus the stat triple the block record was
/// issued against. Shared (via `Arc`) by every block that falls within the
/// same file, since consecutive blocks usually share one open handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: i64,
    pub inode: u64,
}

/// A block record's lifecycle, replacing the original's independent
/// `HAS_HASH` / `HAS_PARITY` bits with the three states they ever actually
/// occupy in practice: a block always gains a hash before it can gain
/// parity, and the two are set together at the end of a successful sync
/// step, never HAS_PARITY alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Neither flag set: an untouched or never-synced block.
    Fresh,
    /// `HAS_HASH` set, `HAS_PARITY` not yet: the hash has been computed (or
    /// verified) but on-disk parity has not been confirmed to reflect it.
    HashedNotParity,
    /// Both flags set: on-disk parity is known to reflect this block.
    HashedAndParity,
}

impl BlockState {
    pub fn has_hash(self) -> bool {
        !matches!(self, BlockState::Fresh)
    }

    pub fn has_parity(self) -> bool {
        matches!(self, BlockState::HashedAndParity)
    }

    /// One block index is "invalid" -- i.e. must be (re)processed by a sync
    /// pass -- whenever it lacks either flag.
    pub fn needs_sync(self) -> bool {
        !self.has_parity()
    }
}

/// Per-(disk, block index) metadata. `position` is the byte offset within
/// `file` where this block's bytes begin.
#[derive(Debug, Clone)]
pub struct BlockRecord {
    pub file: Arc<FileRecord>,
    pub position: u64,
    pub state: BlockState,
    pub hash: [u8; HASH_SIZE],
}

impl BlockRecord {
    pub fn new(file: Arc<FileRecord>, position: u64) -> Self {
        BlockRecord {
            file,
            position,
            state: BlockState::Fresh,
            hash: [0u8; HASH_SIZE],
        }
    }

    /// Copies a freshly computed hash into the record without marking it
    /// trusted yet -- step (f) of the sync state machine: "copy the hash,
    /// but don't set HAS_HASH" so an abort mid-pass leaves no false
    /// witness.
    pub fn stage_hash(&mut self, hash: [u8; HASH_SIZE]) {
        self.hash = hash;
    }

    /// Commits both flags at once, the only transition allowed once parity
    /// for this block index has actually been written durably.
    pub fn mark_hashed_and_parity(&mut self) {
        self.state = BlockState::HashedAndParity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> Arc<FileRecord> {
        Arc::new(FileRecord {
            path: PathBuf::from("/data/a.bin"),
            size: 4096,
            mtime: 0,
            inode: 1,
        })
    }

    #[test]
    fn fresh_block_needs_sync() {
        let record = BlockRecord::new(sample_file(), 0);
        assert_eq!(record.state, BlockState::Fresh);
        assert!(record.state.needs_sync());
        assert!(!record.state.has_hash());
        assert!(!record.state.has_parity());
    }

    #[test]
    fn staging_hash_does_not_flip_state() {
        let mut record = BlockRecord::new(sample_file(), 0);
        record.stage_hash([0xAB; HASH_SIZE]);
        assert_eq!(record.state, BlockState::Fresh);
        assert_eq!(record.hash, [0xAB; HASH_SIZE]);
    }

    #[test]
    fn committing_sets_both_flags_together() {
        let mut record = BlockRecord::new(sample_file(), 0);
        record.stage_hash([1; HASH_SIZE]);
        record.mark_hashed_and_parity();
        assert!(record.state.has_hash());
        assert!(record.state.has_parity());
        assert!(!record.state.needs_sync());
    }
}
