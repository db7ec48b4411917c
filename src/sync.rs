//! The sync driver: the sole producer of valid parity. Walks the
//! block-indexed view ascending, for each index reads every data disk's
//! slot, verifies or records its hash, drives the parity kernel over the
//! assembled buffers, writes parity, and only then commits both flags --
//! never half-committing a block index.

use tracing::{error, info, warn};

use crate::block::iterator::{count_work, BlockIndexIterator};
use crate::buffer::BufferPool;
use crate::disk::{DiskView, FileHandle, Hasher, ParityContainer};
use crate::error::{Error, Result};
use crate::kernel::EngineContext;
use crate::progress::{ProgressReporter, StopFlag};

/// Summary of one `SyncDriver::run` call.
#[derive(Debug, Clone, Copy)]
pub struct SyncOutcome {
    pub blocks_processed: u64,
    pub blocks_total: u64,
    pub stopped_early: bool,
    pub last_completed_index: Option<u64>,
}

/// Owns the per-pass collaborators exclusively for the duration of `run`:
/// one file handle per data disk, one parity container per parity level,
/// and the hash function. `view` is borrowed mutably for the same span,
/// since the sync driver is the only writer of block-record state.
pub struct SyncDriver<'a> {
    ctx: &'a EngineContext,
    view: &'a mut dyn DiskView,
    handles: Vec<Box<dyn FileHandle>>,
    parity: Vec<Box<dyn ParityContainer>>,
    hasher: Box<dyn Hasher>,
    block_size: usize,
}

impl<'a> SyncDriver<'a> {
    pub fn new(
        ctx: &'a EngineContext,
        view: &'a mut dyn DiskView,
        handles: Vec<Box<dyn FileHandle>>,
        parity: Vec<Box<dyn ParityContainer>>,
        hasher: Box<dyn Hasher>,
        block_size: usize,
    ) -> Self {
        assert_eq!(handles.len(), view.disk_count());
        SyncDriver {
            ctx,
            view,
            handles,
            parity,
            hasher,
            block_size,
        }
    }

    /// Runs one forward pass over `[blockstart, blockmax)`. Returns
    /// `Ok(SyncOutcome)` on success (including a clean `stop`-flagged
    /// interrupt) or `Err` on the first fatal error, after a best-effort
    /// close of every handle either way.
    pub fn run(&mut self, blockstart: u64, blockmax: u64, stop: &StopFlag) -> Result<SyncOutcome> {
        let nd = self.handles.len();
        let np = self.parity.len();

        // (1) Resize parity files to blockmax*block_size before any write.
        for (level, container) in self.parity.iter_mut().enumerate() {
            container.resize(blockmax, self.block_size).map_err(|e| {
                error!("failed to resize parity stream {level}: {e}");
                e
            })?;
        }

        let blocks_total = count_work(self.view, blockstart, blockmax);
        info!(
            "sync: {} data disks, {} parity levels, {} blocks to process",
            nd, np, blocks_total
        );
        let mut progress = ProgressReporter::new("sync", blocks_total, self.block_size);

        let mut pool = BufferPool::new(nd + np, self.block_size);
        let mut last_completed_index = None;
        let mut stopped_early = false;
        let mut fatal: Option<Error> = None;

        let indices: Vec<u64> = BlockIndexIterator::new(self.view, blockstart, blockmax).collect();
        for index in indices {
            if stop.is_stopped() {
                stopped_early = true;
                break;
            }
            match self.process_index(index, nd, np, &mut pool) {
                Ok(()) => {
                    last_completed_index = Some(index);
                    progress.advance();
                }
                Err(e) => {
                    error!("sync: fatal error at block {index}: {e}");
                    fatal = Some(e);
                    break;
                }
            }
        }
        progress.finish();

        self.close_all_best_effort();

        if let Some(e) = fatal {
            return Err(e);
        }
        Ok(SyncOutcome {
            blocks_processed: progress.processed_units(),
            blocks_total,
            stopped_early,
            last_completed_index,
        })
    }

    /// The per-block-index state machine (§4.7): assemble every disk's
    /// slot, generate parity, write it, then commit flags.
    fn process_index(&mut self, index: u64, nd: usize, np: usize, pool: &mut BufferPool) -> Result<()> {
        let mut pending = Vec::with_capacity(nd);

        for disk in 0..nd {
            match self.view.block_at(disk, index) {
                None => {
                    pool.slot_mut(disk).fill(0);
                }
                Some(mut record) => {
                    let handle = &mut self.handles[disk];
                    if handle.current_file() != Some(record.file.as_ref()) {
                        handle.open_for(&record.file)?;
                    }
                    let (size, mtime, inode) = handle.stat()?;
                    if size != record.file.size || mtime != record.file.mtime || inode != record.file.inode {
                        return Err(Error::FileChanged {
                            path: record.file.path.clone(),
                            expected_size: record.file.size,
                            expected_mtime: record.file.mtime,
                            expected_inode: record.file.inode,
                        });
                    }

                    let slot = pool.slot_mut(disk);
                    let live = handle.read(record.position, slot)?;
                    let computed = self.hasher.hash(&pool.slot_mut(disk)[..live]);

                    if record.state.has_hash() {
                        if computed != record.hash {
                            return Err(Error::HashMismatch {
                                disk: format!("disk-{disk}"),
                                index,
                            });
                        }
                    } else {
                        record.stage_hash(computed);
                    }
                    pending.push((disk, record));
                }
            }
        }

        // Parity generation and write-out, over every slot including the
        // zeroed ones standing in for absent data.
        {
            let mut v = pool.slots_mut();
            self.ctx.parity_generate(nd, np, self.block_size, &mut v)?;
        }
        for (level, container) in self.parity.iter_mut().enumerate() {
            let buf = pool.slot_mut(nd + level);
            container.write(index, buf).map_err(|e| {
                warn!("sync: parity write failed at block {index}, level {level}: {e}");
                e
            })?;
        }

        // Only now, with parity durably written, commit both flags.
        for (disk, mut record) in pending {
            record.mark_hashed_and_parity();
            self.view.set_block(disk, index, record);
        }
        self.view.mark_dirty();
        Ok(())
    }

    /// Closes every file handle and fsyncs+closes every parity container,
    /// regardless of how `run` is exiting. Close failures are logged but
    /// never rescind parity already durably written by prior `write`
    /// calls, per the error-handling design table.
    fn close_all_best_effort(&mut self) {
        for handle in &mut self.handles {
            if let Err(e) = handle.close() {
                warn!("sync: error closing data file handle: {e}");
            }
        }
        for container in &mut self.parity {
            if let Err(e) = container.sync() {
                warn!("sync: error fsyncing parity stream: {e}");
            }
            if let Err(e) = container.close() {
                warn!("sync: error closing parity stream: {e}");
            }
        }
    }
}
