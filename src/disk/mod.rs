//! Ports the sync driver consumes from its collaborators: the
//! block-indexed disk view (state-file stand-in), file handles, the parity
//! container, and the hash function. Default filesystem-backed
//! implementations live in [`fs`].
//!
//! These mirror the teacher's hexagonal "ports" pattern -- small,
//! synchronous traits at the seam between the core and the outside world --
//! adapted to a single-threaded, blocking driver instead of an async one,
//! since nothing in the sync pass ever needs to suspend.

pub mod fs;

use crate::block::{BlockRecord, FileRecord, HASH_SIZE};
use crate::error::Result;

/// Block-indexed query over the array's metadata: "for disk `d` and block
/// index `i`, return the block record or absent." Also the write-back path
/// for the sync driver's in-place mutations (staged hash, committed flags).
pub trait DiskView {
    /// Number of data disks in the array.
    fn disk_count(&self) -> usize;

    /// The block record at `(disk, index)`, or `None` if this disk has no
    /// data at that index.
    fn block_at(&self, disk: usize, index: u64) -> Option<BlockRecord>;

    /// Writes a mutated record back. Called after staging a hash and again
    /// after committing both flags; never called for indices that were
    /// `None` in `block_at`.
    fn set_block(&mut self, disk: usize, index: u64, record: BlockRecord);

    /// Marks the underlying state as needing a write-out to its backing
    /// store (the `state->need_write = 1` flag in the original).
    fn mark_dirty(&mut self);
}

/// A disk's current open file and cached stat triple. Exclusive to its
/// disk slot for the duration of a sync pass.
pub trait FileHandle {
    /// Closes the currently open file, if any, reopening `file` in its
    /// place. A no-op if `file` is already the open file.
    fn open_for(&mut self, file: &FileRecord) -> Result<()>;

    /// Closes whatever file is currently open, if any.
    fn close(&mut self) -> Result<()>;

    /// The stat triple of the currently open file.
    fn stat(&self) -> Result<(u64, i64, u64)>;

    /// Reads `buf.len()` bytes starting at `position` into `buf`. Returns
    /// the number of live bytes actually present in the file; bytes beyond
    /// that (a short read past EOF) are zero-padded into `buf` by the
    /// implementation.
    fn read(&mut self, position: u64, buf: &mut [u8]) -> Result<usize>;

    fn current_file(&self) -> Option<&FileRecord>;
}

/// create/write-at/fsync/close/resize over a parity stream.
pub trait ParityContainer {
    /// Grows the parity file to hold `blockmax` blocks of `block_size`
    /// bytes each, if it doesn't already. Per the open question in the
    /// design notes, this only ever grows -- existing valid parity for
    /// indices still in range is never at risk of truncation.
    fn resize(&mut self, blockmax: u64, block_size: usize) -> Result<()>;

    fn write(&mut self, index: u64, buf: &[u8]) -> Result<()>;

    /// Reads block `index` into `buf`. Not named in the distilled external
    /// interface (§6 only lists create/write/sync/close/resize), but the
    /// recovery driver has to read surviving parity somehow; added here as
    /// the symmetric counterpart to `write` rather than inventing a
    /// separate read-only port. See DESIGN.md.
    fn read(&mut self, index: u64, buf: &mut [u8]) -> Result<()>;

    fn sync(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Fixed-output byte-wise digest of a buffer.
pub trait Hasher {
    fn hash(&self, buf: &[u8]) -> [u8; HASH_SIZE];
}

/// Write-back capability the recovery driver's `fix` mode needs to
/// persist reconstructed bytes onto a data disk. Never used by the sync
/// driver, which only ever reads data disks -- `FileHandle` stays
/// read-only on purpose, so this is a separate, narrower port rather than
/// widening that one.
pub trait DataWriteBack {
    fn write_at(&mut self, path: &std::path::Path, position: u64, buf: &[u8]) -> Result<()>;
}
