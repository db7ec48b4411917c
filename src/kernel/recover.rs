//! Recovery of up to P missing data and/or parity streams, by solving a
//! small linear system over GF(2⁸) and then regenerating any requested
//! parity rows from the now-complete data.

use crate::error::{Error, Result};
use crate::gf::{mul_xor_into, CoefficientTable, GF};
use crate::kernel::dispatch::SimdLevel;

/// `id` lists missing data-column indices (ascending, distinct, < nd).
/// `ip` lists missing parity-row indices (ascending, distinct, < np).
/// Precondition: `id.len() + ip.len() <= np`; surviving parity rows not
/// named in `ip` are assumed correct. `v` holds all `nd + np` buffers;
/// entries named in `id`/`ip` are treated as scratch output, their current
/// content ignored.
pub fn recover(
    level: SimdLevel,
    coeffs: &CoefficientTable,
    size: usize,
    id: &[usize],
    ip: &[usize],
    v: &mut [&mut [u8]],
) -> Result<()> {
    let nd = coeffs.nd();
    let np = coeffs.np();
    if size % 64 != 0 {
        return Err(Error::UnalignedBlockSize { size });
    }
    check_ascending_distinct(id)?;
    check_ascending_distinct(ip)?;
    if id.len() + ip.len() > np {
        return Err(Error::InsufficientParity {
            requested: id.len() + ip.len(),
            available: np,
        });
    }
    if id.is_empty() {
        // Nothing missing on the data side; just regenerate requested parity.
        return regenerate_parity(level, coeffs, size, ip, v);
    }

    // Choose the first `id.len()` surviving parity rows not named in `ip`.
    let survivors: Vec<usize> = (0..np).filter(|k| !ip.contains(k)).take(id.len()).collect();
    debug_assert_eq!(survivors.len(), id.len());

    let nrd = id.len();
    let mut a = vec![vec![0u8; nrd]; nrd];
    for r in 0..nrd {
        for c in 0..nrd {
            a[r][c] = coeffs.get(survivors[r], id[c]);
        }
    }
    let a_inv = invert(&a)?;

    // y[r] = P_{survivors[r]} XOR (known data columns' contribution).
    let mut y: Vec<Vec<u8>> = Vec::with_capacity(nrd);
    for &s in &survivors {
        let mut row = v[nd + s].to_vec();
        for j in 0..nd {
            if id.contains(&j) {
                continue;
            }
            let c = coeffs.get(s, j);
            mul_xor_into(&mut row, v[j], c);
        }
        y.push(row);
    }

    // x = A^-1 * y, byte by byte across the whole block.
    for (c, &missing_j) in id.iter().enumerate() {
        v[missing_j].fill(0);
        for r in 0..nrd {
            let coefficient = a_inv[c][r];
            if coefficient == 0 {
                continue;
            }
            let src = y[r].clone();
            mul_xor_into(v[missing_j], &src, coefficient);
        }
    }

    if !ip.is_empty() {
        regenerate_parity(level, coeffs, size, ip, v)?;
    }
    Ok(())
}

/// Restricted recovery: exactly `id.len()` data disks are missing, and the
/// caller pins exactly that many surviving parity rows (`ip`) to use as the
/// linear system. Unlike `recover`, the parity rows not named in `ip` are
/// never touched, because the system is built strictly from the named rows.
///
/// The original C kernel accepted an optional "waste" scratch buffer here so
/// it could reuse unused parity buffer memory for intermediate sums without
/// extra allocation. This implementation computes intermediates into freshly
/// allocated scratch vectors instead, so parity buffers are never mutated as
/// a side effect in the first place; a waste buffer has nothing left to do
/// and is intentionally not threaded through this function.
pub fn recover_data_only(
    level: SimdLevel,
    coeffs: &CoefficientTable,
    size: usize,
    id: &[usize],
    ip: &[usize],
    v: &mut [&mut [u8]],
) -> Result<()> {
    let _ = level;
    let nd = coeffs.nd();
    check_ascending_distinct(id)?;
    check_ascending_distinct(ip)?;
    if id.len() != ip.len() {
        return Err(Error::InsufficientParity {
            requested: id.len(),
            available: ip.len(),
        });
    }

    let nrd = id.len();
    let mut a = vec![vec![0u8; nrd]; nrd];
    for r in 0..nrd {
        for c in 0..nrd {
            a[r][c] = coeffs.get(ip[r], id[c]);
        }
    }
    let a_inv = invert(&a)?;

    let mut y: Vec<Vec<u8>> = Vec::with_capacity(nrd);
    for &s in ip {
        let mut row = v[nd + s].to_vec();
        for j in 0..nd {
            if id.contains(&j) {
                continue;
            }
            let c = coeffs.get(s, j);
            mul_xor_into(&mut row, v[j], c);
        }
        y.push(row);
    }

    for (c, &missing_j) in id.iter().enumerate() {
        v[missing_j].fill(0);
        for r in 0..nrd {
            let coefficient = a_inv[c][r];
            if coefficient == 0 {
                continue;
            }
            let src = y[r].clone();
            mul_xor_into(v[missing_j], &src, coefficient);
        }
    }
    let _ = size;
    Ok(())
}

fn regenerate_parity(
    level: SimdLevel,
    coeffs: &CoefficientTable,
    size: usize,
    ip: &[usize],
    v: &mut [&mut [u8]],
) -> Result<()> {
    let _ = level;
    for &k in ip {
        regenerate_one_row(coeffs, size, k, v);
    }
    Ok(())
}

fn regenerate_one_row(coeffs: &CoefficientTable, _size: usize, k: usize, v: &mut [&mut [u8]]) {
    let nd = coeffs.nd();
    let (data, parity) = v.split_at_mut(nd);
    let out = &mut parity[k];
    out.fill(0);
    for j in 0..nd {
        let c = coeffs.get(k, j);
        mul_xor_into(out, data[j], c);
    }
}

fn check_ascending_distinct(indices: &[usize]) -> Result<()> {
    for w in indices.windows(2) {
        if w[0] >= w[1] {
            return Err(Error::UnsortedIndices);
        }
    }
    Ok(())
}

/// Inverts a small square matrix over GF(2⁸) via Gauss-Jordan elimination
/// with partial pivoting. `n` is at most `MAX_PARITY_LEVELS` in practice.
fn invert(a: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
    let n = a.len();
    let mut work: Vec<Vec<u8>> = a.to_vec();
    let mut inv: Vec<Vec<u8>> = (0..n)
        .map(|i| {
            let mut row = vec![0u8; n];
            row[i] = 1;
            row
        })
        .collect();

    for col in 0..n {
        let pivot_row = (col..n).find(|&r| work[r][col] != 0).ok_or(Error::SingularMatrix)?;
        if pivot_row != col {
            work.swap(col, pivot_row);
            inv.swap(col, pivot_row);
        }
        let pivot = work[col][col];
        let pivot_inv = GF.inv(pivot);
        for c in 0..n {
            work[col][c] = GF.mul(work[col][c], pivot_inv);
            inv[col][c] = GF.mul(inv[col][c], pivot_inv);
        }
        for r in 0..n {
            if r == col {
                continue;
            }
            let factor = work[r][col];
            if factor == 0 {
                continue;
            }
            for c in 0..n {
                work[r][c] ^= GF.mul(factor, work[col][c]);
                inv[r][c] ^= GF.mul(factor, inv[col][c]);
            }
        }
    }
    Ok(inv)
}
