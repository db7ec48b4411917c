//! The parity kernel: pure-compute parity generation and recovery, plus the
//! CPU dispatch that selects a SIMD tier once at startup.
//!
//! The C original kept the SIMD vtable, GF tables, mode, zero buffer and
//! waste buffer as process-wide globals. This crate carries the mutable
//! subset of that state (mode, zero/waste buffers) in an explicit
//! `EngineContext` value instead, threaded through every call; the
//! genuinely read-only GF tables remain a lazily-initialized static since
//! nothing ever needs more than one copy of them.

pub mod dispatch;
pub mod generate;
pub mod recover;
pub mod sort;

use crate::error::{Error, Result};
use crate::gf::{CoefficientTable, Mode};
use dispatch::{CpuQuirks, SimdLevel};

/// Carries the state `raid_init`/`raid_mode`/`raid_zero`/`raid_waste` used
/// to hold as process globals. Build one with [`EngineContext::new`] at
/// process start; it's `Send + Sync` and cheap to share behind an `Arc` if
/// a caller embeds this crate in a larger service, though nothing here
/// spawns threads on its own.
pub struct EngineContext {
    mode: Mode,
    simd_level: SimdLevel,
    quirks: CpuQuirks,
    zero: Option<Vec<u8>>,
    waste: Option<Vec<u8>>,
}

impl EngineContext {
    /// Equivalent of `raid_init()`: probes CPU features and vendor quirks
    /// once, and starts in the default Cauchy mode.
    pub fn new() -> Self {
        let (simd_level, quirks) = dispatch::detect();
        EngineContext {
            mode: Mode::Cauchy,
            simd_level,
            quirks,
            zero: None,
            waste: None,
        }
    }

    pub fn simd_level(&self) -> SimdLevel {
        self.simd_level
    }

    pub fn quirks(&self) -> CpuQuirks {
        self.quirks
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Equivalent of `raid_mode(mode)`: affects the next parity call only,
    /// without re-probing SIMD support.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Equivalent of `raid_zero(buf)`: pins a caller-owned all-zero block
    /// used as a stand-in for missing streams during recovery.
    pub fn set_zero(&mut self, buf: Vec<u8>) {
        self.zero = Some(buf);
    }

    /// Equivalent of `raid_waste(buf)`. Accepted for API fidelity; this
    /// implementation's `recover_data_only` never mutates parity buffers as
    /// scratch in the first place (see kernel::recover docs), so the waste
    /// buffer has nothing to do here.
    pub fn set_waste(&mut self, buf: Vec<u8>) {
        self.waste = Some(buf);
    }

    pub fn zero_block(&self) -> Option<&[u8]> {
        self.zero.as_deref()
    }

    /// `parity_generate`: builds the coefficient table for `(mode, nd, np)`
    /// and dispatches to the selected SIMD tier.
    pub fn parity_generate(&self, nd: usize, np: usize, size: usize, v: &mut [&mut [u8]]) -> Result<()> {
        let coeffs = CoefficientTable::build(self.mode, nd, np)?;
        generate::generate(self.simd_level, &coeffs, size, v)
    }

    /// `parity_recover`: full form, supporting a mix of missing data and
    /// missing parity rows.
    pub fn parity_recover(
        &self,
        nd: usize,
        np: usize,
        size: usize,
        id: &[usize],
        ip: &[usize],
        v: &mut [&mut [u8]],
    ) -> Result<()> {
        let coeffs = CoefficientTable::build(self.mode, nd, np)?;
        recover::recover(self.simd_level, &coeffs, size, id, ip, v)
    }

    /// `parity_recover_data_only`: restricted form pinning the parity rows
    /// to use for recovery.
    pub fn parity_recover_data_only(
        &self,
        nd: usize,
        np: usize,
        size: usize,
        id: &[usize],
        ip: &[usize],
        v: &mut [&mut [u8]],
    ) -> Result<()> {
        let coeffs = CoefficientTable::build(self.mode, nd, np)?;
        recover::recover_data_only(self.simd_level, &coeffs, size, id, ip, v)
    }

    /// `sort_small`: stable ascending sort of a small index array (n ≤ P).
    pub fn sort_small(&self, v: &mut [usize]) {
        sort::sort_small(v);
    }

    /// Validates the limits called out in the external interface section:
    /// nd ≤ 251, np ≤ the active mode's max, size % 64 == 0.
    pub fn validate_shape(&self, nd: usize, np: usize, size: usize) -> Result<()> {
        if nd > crate::gf::MAX_DATA_DISKS {
            return Err(Error::TooManyDataDisks {
                nd,
                max: crate::gf::MAX_DATA_DISKS,
            });
        }
        if np > self.mode.max_parity_levels() {
            return Err(Error::TooManyParityLevels {
                np,
                max: self.mode.max_parity_levels(),
            });
        }
        if size % 64 != 0 {
            return Err(Error::UnalignedBlockSize { size });
        }
        Ok(())
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new()
    }
}
