//! Error types for the parity engine and sync pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the parity kernel or the sync pass.
///
/// Grouped by subsystem so the CLI driver layer can match on kind to decide
/// fatal-vs-continue handling and an exit code, instead of the mixed
/// `fprintf`-and-`errno` signalling of a hand-rolled C implementation.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    // =========================================================================
    // Kernel / GF arithmetic errors
    // =========================================================================
    /// Too many data disks requested of the kernel.
    #[error("data disk count {nd} exceeds the maximum of {max}")]
    TooManyDataDisks { nd: usize, max: usize },

    /// Too many parity levels requested of the kernel.
    #[error("parity level {np} exceeds the maximum of {max}")]
    TooManyParityLevels { np: usize, max: usize },

    /// Block size isn't a multiple of 64, violating the kernel's alignment contract.
    #[error("block size {size} is not a multiple of 64")]
    UnalignedBlockSize { size: usize },

    /// More streams were requested missing than there is parity to recover them.
    #[error("recovery requested {requested} missing streams but only {available} parities survive")]
    InsufficientParity { requested: usize, available: usize },

    /// A caller-supplied index list was not ascending and distinct.
    #[error("index list is not ascending and distinct")]
    UnsortedIndices,

    /// The coefficient submatrix selected for recovery could not be inverted.
    #[error("coefficient submatrix is not invertible for the requested recovery set")]
    SingularMatrix,

    // =========================================================================
    // Sync driver: file collaborator errors (see error-handling design table)
    // =========================================================================
    /// `open` returned not-found. Fatal: abort pass, no flag updates past the
    /// last completed index.
    #[error("missing file '{path}'")]
    MissingFile { path: PathBuf },

    /// `open` returned access-denied. Fatal.
    #[error("no access to file '{path}'")]
    PermissionDenied { path: PathBuf },

    /// Stat triple diverged from the block record's recorded triple. Fatal.
    #[error(
        "file '{path}' changed during sync (expected size={expected_size} mtime={expected_mtime} inode={expected_inode})"
    )]
    FileChanged {
        path: PathBuf,
        expected_size: u64,
        expected_mtime: i64,
        expected_inode: u64,
    },

    /// `read` returned an I/O error. Fatal.
    #[error("read error on '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Recomputed hash didn't match the stored hash: silent data corruption. Fatal.
    #[error("block {index} on disk '{disk}': silent data error, recomputed hash does not match stored hash")]
    HashMismatch { disk: String, index: u64 },

    /// Parity write returned an error. Fatal, but the driver still attempts a
    /// best-effort close of every open handle before unwinding.
    #[error("write error on parity stream {level} at block {index}: {source}")]
    ParityWriteFailed {
        level: usize,
        index: u64,
        #[source]
        source: std::io::Error,
    },

    /// An unexpected close failure. Non-fatal during bail-out, but still
    /// counted toward the pass's cumulative unrecoverable-error total.
    #[error("unexpected close error on '{path}': {source}")]
    CloseFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An open error that is neither missing-file nor permission-denied.
    #[error("unexpected open error on '{path}': {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Configuration / array manifest errors
    // =========================================================================
    /// Failed to read the array manifest file from disk.
    #[error("failed to read array manifest '{path}': {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the array manifest as YAML.
    #[error("failed to parse array manifest '{path}': {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Any other configuration problem caught before a pass starts.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic I/O passthrough for paths not covered by a more specific variant.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classifies whether this error aborts the current sync pass.
    ///
    /// Every variant that can arise mid-pass is fatal per the error-handling
    /// design table; a close failure during bail-out is the sole exception,
    /// since bail-out is already unwinding and a close failure there can't
    /// rescind parity already durably written.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::CloseFailed { .. })
    }

    /// Maps an error to the process exit code the CLI should use.
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            1
        } else {
            0
        }
    }
}
