//! Parity generation: `P_k = ⊕_j m(k,j)·D_j` for every parity row `k`.
//!
//! Three variants share one algorithm -- multiply every data column by its
//! row coefficient and XOR-accumulate into the parity buffer -- differing
//! only in how many bytes they process per inner-loop step. Because they
//! share the algorithm, their outputs are byte-identical by construction,
//! which is exactly the SIMD-equivalence property the kernel is required
//! to uphold.

use crate::error::{Error, Result};
use crate::gf::{mul_xor_into, CoefficientTable, GF};
use crate::kernel::dispatch::SimdLevel;

/// `v[0..nd)` are data block pointers, `v[nd..nd+np)` are parity outputs.
/// `size` must be a multiple of 64; every slice in `v` must be `size` bytes.
pub fn generate(level: SimdLevel, coeffs: &CoefficientTable, size: usize, v: &mut [&mut [u8]]) -> Result<()> {
    let nd = coeffs.nd();
    let np = coeffs.np();
    if size % 64 != 0 {
        return Err(Error::UnalignedBlockSize { size });
    }
    debug_assert_eq!(v.len(), nd + np);

    // Zero the parity outputs before accumulating into them.
    for out in v[nd..nd + np].iter_mut() {
        out.fill(0);
    }

    match level {
        SimdLevel::Avx2 => {
            #[cfg(target_arch = "x86_64")]
            if is_x86_feature_detected!("avx2") {
                unsafe { generate_avx2(coeffs, size, v) };
                return Ok(());
            }
            generate_scalar(coeffs, size, v);
        }
        SimdLevel::Ssse3 => {
            #[cfg(target_arch = "x86_64")]
            if is_x86_feature_detected!("ssse3") {
                unsafe { generate_ssse3(coeffs, size, v) };
                return Ok(());
            }
            generate_scalar(coeffs, size, v);
        }
        SimdLevel::Scalar => generate_scalar(coeffs, size, v),
    }
    Ok(())
}

/// Portable fallback: correct for any (N, P, size), used directly on
/// non-x86_64 targets and as the reference the SIMD variants must match.
pub fn generate_scalar(coeffs: &CoefficientTable, _size: usize, v: &mut [&mut [u8]]) {
    let nd = coeffs.nd();
    let np = coeffs.np();
    for k in 0..np {
        // Split the borrow: data columns are read-only, the parity output
        // at `nd + k` is the only slice mutated in this inner loop.
        let (data, parity) = v.split_at_mut(nd);
        let out = &mut parity[k];
        for j in 0..nd {
            let c = coeffs.get(k, j);
            mul_xor_into(out, data[j], c);
        }
    }
}

/// Builds the 16-entry low/high nibble tables used by the SIMD kernels:
/// `low[x] = c*x` for x in 0..16, `high[x] = c*(x<<4)` for x in 0..16. A
/// byte `b`'s product with `c` is then `low[b & 0xF] ^ high[b >> 4]`.
fn split_tables(c: u8) -> ([u8; 16], [u8; 16]) {
    let mut low = [0u8; 16];
    let mut high = [0u8; 16];
    for x in 0..16u8 {
        low[x as usize] = GF.mul(c, x);
        high[x as usize] = GF.mul(c, x << 4);
    }
    (low, high)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "ssse3")]
unsafe fn generate_ssse3(coeffs: &CoefficientTable, size: usize, v: &mut [&mut [u8]]) {
    use std::arch::x86_64::*;

    let nd = coeffs.nd();
    let np = coeffs.np();
    let low_mask = _mm_set1_epi8(0x0F);

    for k in 0..np {
        let (data, parity) = v.split_at_mut(nd);
        let out = &mut parity[k];
        for j in 0..nd {
            let c = coeffs.get(k, j);
            if c == 0 {
                continue;
            }
            let (low, high) = split_tables(c);
            let low_tbl = _mm_loadu_si128(low.as_ptr() as *const __m128i);
            let high_tbl = _mm_loadu_si128(high.as_ptr() as *const __m128i);

            let src = data[j];
            let chunks = size / 16;
            for i in 0..chunks {
                let off = i * 16;
                let in_vec = _mm_loadu_si128(src.as_ptr().add(off) as *const __m128i);
                let lo_idx = _mm_and_si128(in_vec, low_mask);
                let hi_idx = _mm_and_si128(_mm_srli_epi16(in_vec, 4), low_mask);
                let lo_val = _mm_shuffle_epi8(low_tbl, lo_idx);
                let hi_val = _mm_shuffle_epi8(high_tbl, hi_idx);
                let product = _mm_xor_si128(lo_val, hi_val);

                let dst_ptr = out.as_mut_ptr().add(off) as *mut __m128i;
                let acc = _mm_loadu_si128(dst_ptr);
                _mm_storeu_si128(dst_ptr, _mm_xor_si128(acc, product));
            }
            for i in chunks * 16..size {
                out[i] ^= GF.mul(c, src[i]);
            }
        }
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn generate_avx2(coeffs: &CoefficientTable, size: usize, v: &mut [&mut [u8]]) {
    use std::arch::x86_64::*;

    let nd = coeffs.nd();
    let np = coeffs.np();
    let low_mask = _mm256_set1_epi8(0x0F);

    for k in 0..np {
        let (data, parity) = v.split_at_mut(nd);
        let out = &mut parity[k];
        for j in 0..nd {
            let c = coeffs.get(k, j);
            if c == 0 {
                continue;
            }
            let (low, high) = split_tables(c);
            // AVX2's vpshufb shuffles independently within each 128-bit
            // lane, so the 16-entry table is duplicated into both lanes.
            let mut low256 = [0u8; 32];
            let mut high256 = [0u8; 32];
            low256[0..16].copy_from_slice(&low);
            low256[16..32].copy_from_slice(&low);
            high256[0..16].copy_from_slice(&high);
            high256[16..32].copy_from_slice(&high);
            let low_tbl = _mm256_loadu_si256(low256.as_ptr() as *const __m256i);
            let high_tbl = _mm256_loadu_si256(high256.as_ptr() as *const __m256i);

            let src = data[j];
            let chunks = size / 32;
            for i in 0..chunks {
                let off = i * 32;
                let in_vec = _mm256_loadu_si256(src.as_ptr().add(off) as *const __m256i);
                let lo_idx = _mm256_and_si256(in_vec, low_mask);
                let hi_idx = _mm256_and_si256(_mm256_srli_epi16(in_vec, 4), low_mask);
                let lo_val = _mm256_shuffle_epi8(low_tbl, lo_idx);
                let hi_val = _mm256_shuffle_epi8(high_tbl, hi_idx);
                let product = _mm256_xor_si256(lo_val, hi_val);

                let dst_ptr = out.as_mut_ptr().add(off) as *mut __m256i;
                let acc = _mm256_loadu_si256(dst_ptr);
                _mm256_storeu_si256(dst_ptr, _mm256_xor_si256(acc, product));
            }
            for i in chunks * 32..size {
                out[i] ^= GF.mul(c, src[i]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gf::Mode;

    fn make_block(b: u8, size: usize) -> Vec<u8> {
        vec![b; size]
    }

    #[test]
    fn p1_is_plain_xor() {
        let size = 64;
        let mut d0 = make_block(0xAA, size);
        let mut d1 = make_block(0x55, size);
        let mut d2 = make_block(0xFF, size);
        let mut p0 = make_block(0, size);
        let coeffs = CoefficientTable::build(Mode::Cauchy, 3, 1).unwrap();
        let mut v: Vec<&mut [u8]> = vec![&mut d0, &mut d1, &mut d2, &mut p0];
        generate_scalar(&coeffs, size, &mut v);
        assert!(v[3].iter().all(|&b| b == 0x00));
    }

    #[test]
    fn scalar_matches_ssse3_and_avx2() {
        let size = 256;
        let nd = 6;
        let np = 4;
        let coeffs = CoefficientTable::build(Mode::Cauchy, nd, np).unwrap();

        let mut data: Vec<Vec<u8>> = (0..nd)
            .map(|i| (0..size).map(|b| ((b * 7 + i * 13) % 256) as u8).collect())
            .collect();

        let run = |coeffs: &CoefficientTable, variant: SimdLevel| -> Vec<Vec<u8>> {
            let mut bufs: Vec<Vec<u8>> = data.iter().cloned().collect();
            bufs.extend((0..np).map(|_| vec![0u8; size]));
            {
                let mut v: Vec<&mut [u8]> = bufs.iter_mut().map(|b| b.as_mut_slice()).collect();
                generate(variant, coeffs, size, &mut v).unwrap();
            }
            bufs[nd..].to_vec()
        };

        let scalar_out = run(&coeffs, SimdLevel::Scalar);
        let ssse3_out = run(&coeffs, SimdLevel::Ssse3);
        let avx2_out = run(&coeffs, SimdLevel::Avx2);
        assert_eq!(scalar_out, ssse3_out);
        assert_eq!(scalar_out, avx2_out);
        data.clear();
    }
}
