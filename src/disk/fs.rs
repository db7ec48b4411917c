//! Default adapters over `std::fs`: a data-file handle and a parity
//! container, the two filesystem-backed ports the sync and recovery
//! drivers hold exclusively for the lifetime of a pass.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::block::FileRecord;
use crate::disk::{DataWriteBack, FileHandle, ParityContainer};
use crate::error::{Error, Result};

/// Opens/reads/closes ordinary data files. Reopens whenever the block
/// record names a different file than the one currently open, per the
/// "file descriptor view" data-model entry.
pub struct FsFileHandle {
    current: Option<(Arc<FileRecord>, File)>,
}

impl FsFileHandle {
    pub fn new() -> Self {
        FsFileHandle { current: None }
    }

    fn classify_open_error(err: std::io::Error, path: &Path) -> Error {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::MissingFile { path: path.to_path_buf() },
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied { path: path.to_path_buf() },
            _ => Error::OpenFailed {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

impl Default for FsFileHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHandle for FsFileHandle {
    fn open_for(&mut self, file: &FileRecord) -> Result<()> {
        if let Some((current, _)) = &self.current {
            if current.as_ref() == file {
                return Ok(());
            }
        }
        self.close()?;
        let handle = File::open(&file.path).map_err(|e| Self::classify_open_error(e, &file.path))?;
        self.current = Some((Arc::new(file.clone()), handle));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping a read-only `File` cannot fail in the standard library;
        // this only returns `Result` for trait symmetry with the parity
        // container, where a close-time fsync genuinely can.
        self.current = None;
        Ok(())
    }

    fn stat(&self) -> Result<(u64, i64, u64)> {
        let (record, handle) = self
            .current
            .as_ref()
            .ok_or_else(|| Error::OpenFailed {
                path: PathBuf::new(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no file currently open"),
            })?;
        let meta = handle.metadata().map_err(|e| Error::ReadFailed {
            path: record.path.clone(),
            source: e,
        })?;
        Ok((meta.len(), meta.mtime(), meta.ino()))
    }

    fn read(&mut self, position: u64, buf: &mut [u8]) -> Result<usize> {
        let (record, handle) = self.current.as_mut().ok_or_else(|| Error::ReadFailed {
            path: PathBuf::new(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no file currently open"),
        })?;
        handle.seek(SeekFrom::Start(position)).map_err(|e| Error::ReadFailed {
            path: record.path.clone(),
            source: e,
        })?;

        let mut filled = 0;
        while filled < buf.len() {
            let n = handle.read(&mut buf[filled..]).map_err(|e| Error::ReadFailed {
                path: record.path.clone(),
                source: e,
            })?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        // Short reads beyond EOF are zero-padded into the caller's buffer.
        for b in buf[filled..].iter_mut() {
            *b = 0;
        }
        Ok(filled)
    }

    fn current_file(&self) -> Option<&FileRecord> {
        self.current.as_ref().map(|(record, _)| record.as_ref())
    }
}

/// create/write-at/fsync/close/resize over a single parity stream file.
/// `resize` only ever grows the file (see the §9 open-question decision
/// recorded in DESIGN.md): existing valid parity for in-range indices is
/// never at risk of truncation during a normal sync pass.
pub struct FsParityContainer {
    path: PathBuf,
    file: File,
    level: usize,
}

impl FsParityContainer {
    /// Opens parity level 0. Use [`FsParityContainer::create_at_level`] when
    /// an array has more than one parity stream, so write errors name the
    /// stream that actually failed.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        Self::create_at_level(path, 0)
    }

    pub fn create_at_level(path: impl Into<PathBuf>, level: usize) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| Error::OpenFailed { path: path.clone(), source: e })?;
        Ok(FsParityContainer { path, file, level })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ParityContainer for FsParityContainer {
    fn resize(&mut self, blockmax: u64, block_size: usize) -> Result<()> {
        let target = blockmax.saturating_mul(block_size as u64);
        let current = self.file.metadata().map_err(Error::Io)?.len();
        if current < target {
            self.file.set_len(target).map_err(Error::Io)?;
        }
        Ok(())
    }

    fn write(&mut self, index: u64, buf: &[u8]) -> Result<()> {
        let offset = index * buf.len() as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error::ParityWriteFailed {
                level: self.level,
                index,
                source: e,
            })?;
        self.file.write_all(buf).map_err(|e| Error::ParityWriteFailed {
            level: self.level,
            index,
            source: e,
        })
    }

    fn read(&mut self, index: u64, buf: &mut [u8]) -> Result<()> {
        let offset = index * buf.len() as u64;
        self.file.seek(SeekFrom::Start(offset)).map_err(|e| Error::ReadFailed {
            path: self.path.clone(),
            source: e,
        })?;
        self.file.read_exact(buf).map_err(|e| Error::ReadFailed {
            path: self.path.clone(),
            source: e,
        })
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all().map_err(Error::Io)
    }

    fn close(&mut self) -> Result<()> {
        self.file.sync_all().map_err(|e| Error::CloseFailed {
            path: self.path.clone(),
            source: e,
        })
    }
}

/// Write-back adapter for the recovery driver's `fix` mode: reopens the
/// target file read-write for each call rather than holding a handle
/// across a pass, since writes during recovery are sparse and never
/// sequential the way sync's reads are.
#[derive(Default)]
pub struct FsDataWriteBack;

impl FsDataWriteBack {
    pub fn new() -> Self {
        FsDataWriteBack
    }
}

impl DataWriteBack for FsDataWriteBack {
    fn write_at(&mut self, path: &Path, position: u64, buf: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| FsFileHandle::classify_open_error(e, path))?;
        file.seek(SeekFrom::Start(position)).map_err(|e| Error::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        file.write_all(buf).map_err(|e| Error::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        file.sync_all().map_err(Error::Io)
    }
}
