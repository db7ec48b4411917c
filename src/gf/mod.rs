//! GF(2⁸) arithmetic and per-parity coefficient matrices.
//!
//! Everything in this module is pure, deterministic, and independent of the
//! I/O layer: it's the algebraic foundation the kernel module builds on.

pub mod coefficients;
pub mod tables;

pub use coefficients::{CoefficientTable, Mode, MAX_DATA_DISKS, MAX_PARITY_LEVELS};
pub use tables::{mul_xor_into, xor_into, GfTables, GF};
