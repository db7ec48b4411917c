//! Enumerates candidate block indices over a range, applying the skip
//! predicate: an index is processed only if at least one disk has a block
//! record there that still needs syncing.

use crate::disk::DiskView;

/// True if block index `i` has at least one disk whose record there still
/// needs syncing (lacks `HAS_PARITY`, whether or not it has `HAS_HASH`).
/// An index with no such disk is skipped entirely -- its parity is assumed
/// already valid.
pub fn index_needs_processing(view: &dyn DiskView, index: u64) -> bool {
    (0..view.disk_count()).any(|disk| match view.block_at(disk, index) {
        Some(record) => record.state.needs_sync(),
        None => false,
    })
}

/// Counts how many indices in `[blockstart, blockmax)` need processing.
/// Used for the progress total; must be computed with the same predicate
/// as the work pass and over unchanged state, so the two agree exactly
/// (the "skip predicate stability" property).
pub fn count_work(view: &dyn DiskView, blockstart: u64, blockmax: u64) -> u64 {
    (blockstart..blockmax).filter(|&i| index_needs_processing(view, i)).count() as u64
}

/// Lazily yields the indices in `[blockstart, blockmax)` that need
/// processing, in ascending order -- the work pass itself.
pub struct BlockIndexIterator<'a> {
    view: &'a dyn DiskView,
    next: u64,
    end: u64,
}

impl<'a> BlockIndexIterator<'a> {
    pub fn new(view: &'a dyn DiskView, blockstart: u64, blockmax: u64) -> Self {
        BlockIndexIterator {
            view,
            next: blockstart,
            end: blockmax,
        }
    }
}

impl<'a> Iterator for BlockIndexIterator<'a> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        while self.next < self.end {
            let candidate = self.next;
            self.next += 1;
            if index_needs_processing(self.view, candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockRecord, BlockState, FileRecord};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct FakeView {
        disks: usize,
        records: HashMap<(usize, u64), BlockRecord>,
    }

    impl DiskView for FakeView {
        fn disk_count(&self) -> usize {
            self.disks
        }
        fn block_at(&self, disk: usize, index: u64) -> Option<BlockRecord> {
            self.records.get(&(disk, index)).cloned()
        }
        fn set_block(&mut self, disk: usize, index: u64, record: BlockRecord) {
            self.records.insert((disk, index), record);
        }
        fn mark_dirty(&mut self) {}
    }

    fn file() -> Arc<FileRecord> {
        Arc::new(FileRecord {
            path: PathBuf::from("/data/a.bin"),
            size: 4096,
            mtime: 0,
            inode: 1,
        })
    }

    #[test]
    fn skips_indices_with_no_disk_needing_sync() {
        let mut view = FakeView {
            disks: 2,
            records: HashMap::new(),
        };
        let mut done = BlockRecord::new(file(), 0);
        done.state = BlockState::HashedAndParity;
        view.set_block(0, 5, done);

        let mut pending = BlockRecord::new(file(), 0);
        pending.state = BlockState::Fresh;
        view.set_block(1, 9, pending);

        assert!(!index_needs_processing(&view, 5));
        assert!(index_needs_processing(&view, 9));
        assert!(!index_needs_processing(&view, 100)); // absent everywhere
    }

    #[test]
    fn count_pass_and_work_pass_agree() {
        let mut view = FakeView {
            disks: 3,
            records: HashMap::new(),
        };
        for i in 0..50u64 {
            let mut record = BlockRecord::new(file(), i * 4096);
            record.state = if i % 3 == 0 {
                BlockState::HashedAndParity
            } else {
                BlockState::Fresh
            };
            view.set_block(0, i, record);
        }

        let counted = count_work(&view, 0, 50);
        let visited: Vec<u64> = BlockIndexIterator::new(&view, 0, 50).collect();
        assert_eq!(counted, visited.len() as u64);
        for i in visited {
            assert_ne!(i % 3, 0);
        }
    }
}
