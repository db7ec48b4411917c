//! blockraid: snapshot-style block-level parity protection across
//! independent data disks.
//!
//! # Architecture
//!
//! ```text
//! gf (GF(2⁸)) → kernel (dispatch, generate, recover) → sync / recovery
//!                                   ▲                        ▲
//!                          block, buffer (plumbing)   disk (ports), manifest, hash
//! ```
//!
//! `gf` and `kernel` are the pure-compute parity engine: GF(2⁸) arithmetic,
//! per-mode coefficient matrices, SIMD dispatch, and the generate/recover
//! kernels themselves. `disk` defines the ports (`DiskView`, `FileHandle`,
//! `ParityContainer`, `Hasher`, `DataWriteBack`) that `sync` and `recovery`
//! consume to drive those kernels over real data; `manifest` and `hash`,
//! together with `disk::fs`, are this crate's default filesystem-backed
//! implementations of those ports. `block`, `buffer` and `progress` are
//! shared plumbing: block-record bookkeeping, the cache-aligned I/O
//! buffer arena, and progress/interrupt signaling.
//!
//! # Modules
//!
//! - [`gf`] - GF(2⁸) arithmetic and per-mode coefficient matrices
//! - [`kernel`] - CPU dispatch and the parity generate/recover kernels
//! - [`block`] - Block-record bookkeeping and the work-index iterator
//! - [`buffer`] - Cache-aligned per-block buffer arena
//! - [`disk`] - Ports the sync/recovery drivers consume, plus filesystem adapters
//! - [`manifest`] - The array manifest: this crate's state-file stand-in
//! - [`hash`] - The default BLAKE3 block-hash adapter
//! - [`progress`] - Progress narration and the cooperative stop flag
//! - [`sync`] - The sync driver: the sole producer of valid parity
//! - [`recovery`] - The recovery driver: `check` and `fix` over missing streams
//! - [`error`] - Error types shared across every module above

pub mod block;
pub mod buffer;
pub mod disk;
pub mod error;
pub mod gf;
pub mod hash;
pub mod kernel;
pub mod manifest;
pub mod progress;
pub mod recovery;
pub mod sync;

pub use error::{Error, Result};
pub use kernel::EngineContext;
