//! CPU feature detection and the empirically-tuned vendor quirks that
//! influence kernel variant selection.

use std::fmt;

/// Best available SIMD tier for the parity kernel, ordered worst-to-best so
/// `PartialOrd` gives the expected "prefer the higher tier" comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SimdLevel {
    Scalar,
    Ssse3,
    Avx2,
}

impl fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SimdLevel::Scalar => "scalar",
            SimdLevel::Ssse3 => "ssse3",
            SimdLevel::Avx2 => "avx2",
        };
        write!(f, "{s}")
    }
}

/// x86 vendor/family/model-driven quirks, read once at `init` and then
/// carried as plain booleans -- the shape the C original had as ad hoc
/// `cpu_has_slowmult()` / `cpu_has_slowextendedreg()` helpers.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuQuirks {
    /// Intel Atom-class (family 6, model 28): prefer a hash algorithm that
    /// avoids integer multiplication. Recorded for collaborators that offer
    /// more than one hash algorithm to choose between; this crate's default
    /// hash adapter (BLAKE3) has no alternate implementation to switch to,
    /// so the flag is currently inert but still detected for fidelity.
    pub prefers_low_multiplication_hash: bool,
    /// AMD Bulldozer-class (family 21): avoid kernels that touch the upper
    /// half of the extended SIMD register file. In practice this caps SIMD
    /// selection at SSSE3 even when AVX2 is reported present.
    pub avoid_extended_simd_registers: bool,
}

/// Detect the best SIMD tier and vendor quirks for the running CPU. On
/// non-x86_64 targets, only the scalar kernel exists.
pub fn detect() -> (SimdLevel, CpuQuirks) {
    #[cfg(target_arch = "x86_64")]
    {
        let quirks = x86::detect_quirks();
        let mut level = if is_x86_feature_detected!("avx2") {
            SimdLevel::Avx2
        } else if is_x86_feature_detected!("ssse3") {
            SimdLevel::Ssse3
        } else {
            SimdLevel::Scalar
        };
        if quirks.avoid_extended_simd_registers && level == SimdLevel::Avx2 {
            level = SimdLevel::Ssse3;
        }
        (level, quirks)
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        (SimdLevel::Scalar, CpuQuirks::default())
    }
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use super::CpuQuirks;
    use std::arch::x86_64::__cpuid;

    /// Reads the raw CPUID vendor string and family/model, the way the
    /// portable `is_x86_feature_detected!` macro does not expose.
    pub fn detect_quirks() -> CpuQuirks {
        // CPUID leaf 0: vendor string in ebx:edx:ecx.
        let leaf0 = unsafe { __cpuid(0) };
        let mut vendor = [0u8; 12];
        vendor[0..4].copy_from_slice(&leaf0.ebx.to_le_bytes());
        vendor[4..8].copy_from_slice(&leaf0.edx.to_le_bytes());
        vendor[8..12].copy_from_slice(&leaf0.ecx.to_le_bytes());
        let vendor = std::str::from_utf8(&vendor).unwrap_or("");

        // CPUID leaf 1: family/model in eax.
        let leaf1 = unsafe { __cpuid(1) };
        let eax = leaf1.eax;
        let stepping_ignored = eax & 0xF;
        let _ = stepping_ignored;
        let mut family = (eax >> 8) & 0xF;
        let model_low = (eax >> 4) & 0xF;
        let extended_model = (eax >> 16) & 0xF;
        let extended_family = (eax >> 20) & 0xFF;

        // Per Intel/AMD CPUID convention: if the base family is 6 or 15,
        // fold in the extended model nibble; if the base family is 15, also
        // fold in the extended family byte.
        let model = if family == 6 || family == 15 {
            (extended_model << 4) | model_low
        } else {
            model_low
        };
        if family == 15 {
            family += extended_family;
        }

        let is_intel = vendor == "GenuineIntel";
        let is_amd = vendor == "AuthenticAMD";

        CpuQuirks {
            // Intel Atom D4xx/D5xx/N4xx/N5xx (Bonnell core).
            prefers_low_multiplication_hash: is_intel && family == 6 && model == 28,
            // AMD Bulldozer/Piledriver/Steamroller/Excavator family.
            avoid_extended_simd_registers: is_amd && family == 21,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_returns_a_usable_level() {
        let (level, _quirks) = detect();
        assert!(level >= SimdLevel::Scalar);
    }

    #[test]
    fn extended_register_quirk_caps_to_ssse3() {
        let quirks = CpuQuirks {
            prefers_low_multiplication_hash: false,
            avoid_extended_simd_registers: true,
        };
        let level = if quirks.avoid_extended_simd_registers {
            SimdLevel::Ssse3
        } else {
            SimdLevel::Avx2
        };
        assert_eq!(level, SimdLevel::Ssse3);
    }
}
