//! Per-parity coefficient matrices for the two supported modes.
//!
//! Parity level 0 is always pure XOR (coefficient 1 for every data column)
//! and parity level 1 is always the same Reed-Solomon row in both modes --
//! `m(1, j) = GENERATOR^j` -- so Cauchy and Vandermonde agree bit-for-bit
//! whenever P≤2. Levels 2 and above diverge: Vandermonde keeps using
//! `GENERATOR^(k*j)` (only proven well-behaved up to P=3 here), while Cauchy
//! uses a genuine Cauchy matrix extended with a point at infinity.
//!
//! Bolting an all-ones row and a power row onto an otherwise-untouched
//! Cauchy matrix `1/(x_k ⊕ y_j)` is not MDS: an arbitrary P-row/P-column
//! submatrix can come out singular, which breaks recovery for erasure
//! patterns well inside the parity budget. This builds row 0 as the formal
//! "point at infinity" row of an *extended* Cauchy matrix instead -- the
//! standard way to reach code length `q+1` over GF(q) -- and derives row 1
//! from the same generator-power sequence as the data columns, so it falls
//! out of the real Cauchy formula rather than being substituted in:
//!
//!   y_j    = GENERATOR^-j                        (data column j, j < nd)
//!   z_1    = 0
//!   z_k    = GENERATOR^-(MAX_DATA_DISKS + k - 2)  (k in 2..MAX_PARITY_LEVELS)
//!   m(0,j) = 1                                    (the infinity row)
//!   m(k,j) = 1 / (z_k ⊕ y_j)                      (k >= 1)
//!
//! `z_1 ⊕ y_j == y_j`, so `m(1,j) = 1/y_j = GENERATOR^j`: the desired power
//! row, reached honestly instead of hand-substituted. Every `z_k` (k >= 1)
//! sits at an exponent strictly above any exponent a `y_j` can use for
//! `nd <= MAX_DATA_DISKS`, so the two sequences never collide, every row
//! beyond 0 is a genuine Cauchy row, and the whole matrix -- infinity row
//! included -- keeps the Cauchy determinant's guarantee that any square
//! submatrix is invertible.

use super::tables::GF;
use crate::error::{Error, Result};

pub const MAX_DATA_DISKS: usize = 251;
pub const MAX_PARITY_LEVELS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Default mode; supports up to 6 parity levels.
    Cauchy,
    /// Supports up to 3 parity levels; simpler per-row multiplications, and
    /// the only mode available before SSSE3-class dispatch existed.
    Vandermonde,
}

impl Mode {
    pub fn max_parity_levels(self) -> usize {
        match self {
            Mode::Cauchy => MAX_PARITY_LEVELS,
            Mode::Vandermonde => 3,
        }
    }
}

/// The `np` x `nd` matrix of coefficients `m(k, j)` for the current
/// `(mode, nd, np)`, computed once per kernel call (cheap: at most 6*251
/// table lookups) and then reused across every byte offset in the block.
pub struct CoefficientTable {
    nd: usize,
    np: usize,
    rows: Vec<Vec<u8>>,
}

impl CoefficientTable {
    pub fn build(mode: Mode, nd: usize, np: usize) -> Result<Self> {
        if nd > MAX_DATA_DISKS {
            return Err(Error::TooManyDataDisks {
                nd,
                max: MAX_DATA_DISKS,
            });
        }
        if np > mode.max_parity_levels() {
            return Err(Error::TooManyParityLevels {
                np,
                max: mode.max_parity_levels(),
            });
        }

        let mut rows = Vec::with_capacity(np);
        for k in 0..np {
            let mut row = Vec::with_capacity(nd);
            for j in 0..nd {
                row.push(coefficient(mode, k, j, nd));
            }
            rows.push(row);
        }
        Ok(CoefficientTable { nd, np, rows })
    }

    #[inline]
    pub fn get(&self, k: usize, j: usize) -> u8 {
        debug_assert!(k < self.np && j < self.nd);
        self.rows[k][j]
    }

    pub fn nd(&self) -> usize {
        self.nd
    }

    pub fn np(&self) -> usize {
        self.np
    }
}

/// Data column `j`'s Cauchy coordinate: `GENERATOR^-j`. Distinct for every
/// `j < MAX_DATA_DISKS` and never zero, since it's a power of a generator.
fn cauchy_y(j: usize) -> u8 {
    GF.inv(GF.generator_pow(j as u32))
}

/// Parity row `k`'s Cauchy coordinate, for `k >= 1`. Row 1 sits at the
/// origin so `m(1,j)` collapses to `1/y_j`, i.e. the shared power row; rows
/// 2.. reuse the same inverse-power trick at exponents `MAX_DATA_DISKS..`,
/// strictly above any exponent a `y_j` uses, so they can never collide with
/// a data column.
fn cauchy_z(k: usize) -> u8 {
    debug_assert!(k >= 1);
    if k == 1 {
        0
    } else {
        GF.inv(GF.generator_pow((MAX_DATA_DISKS + (k - 2)) as u32))
    }
}

fn coefficient(mode: Mode, k: usize, j: usize, nd: usize) -> u8 {
    let _ = nd;
    if k == 0 {
        // The point-at-infinity row of the extended Cauchy matrix.
        return 1;
    }
    match mode {
        Mode::Vandermonde => GF.generator_pow((k * j) as u32),
        Mode::Cauchy => {
            let z = cauchy_z(k);
            let y = cauchy_y(j);
            debug_assert_ne!(z, y, "cauchy z/y sequences must stay disjoint");
            GF.inv(z ^ y)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_zero_is_all_ones() {
        let table = CoefficientTable::build(Mode::Cauchy, 10, 3).unwrap();
        for j in 0..10 {
            assert_eq!(table.get(0, j), 1);
        }
    }

    #[test]
    fn row_one_matches_between_modes() {
        let cauchy = CoefficientTable::build(Mode::Cauchy, 20, 2).unwrap();
        let vandermonde = CoefficientTable::build(Mode::Vandermonde, 20, 2).unwrap();
        for j in 0..20 {
            assert_eq!(cauchy.get(1, j), vandermonde.get(1, j));
        }
    }

    #[test]
    fn p_le_2_modes_agree_on_every_row() {
        for np in 1..=2 {
            let cauchy = CoefficientTable::build(Mode::Cauchy, 30, np).unwrap();
            let vandermonde = CoefficientTable::build(Mode::Vandermonde, 30, np).unwrap();
            for k in 0..np {
                for j in 0..30 {
                    assert_eq!(cauchy.get(k, j), vandermonde.get(k, j));
                }
            }
        }
    }

    #[test]
    fn cauchy_rejects_too_many_data_disks() {
        let err = CoefficientTable::build(Mode::Cauchy, MAX_DATA_DISKS + 1, 1).unwrap_err();
        assert!(matches!(err, Error::TooManyDataDisks { .. }));
    }

    #[test]
    fn vandermonde_rejects_p_above_three() {
        let err = CoefficientTable::build(Mode::Vandermonde, 10, 4).unwrap_err();
        assert!(matches!(err, Error::TooManyParityLevels { .. }));
    }

    #[test]
    fn cauchy_supports_full_251_6_envelope() {
        let table = CoefficientTable::build(Mode::Cauchy, MAX_DATA_DISKS, MAX_PARITY_LEVELS).unwrap();
        // every z/y pair used by rows >= 1 must stay disjoint across the full range
        for k in 1..MAX_PARITY_LEVELS {
            for j in 0..MAX_DATA_DISKS {
                assert_ne!(cauchy_z(k), cauchy_y(j));
                assert_ne!(table.get(k, j), 0);
            }
        }
    }

    /// Gauss-Jordan determinant-by-invertibility check, independent of
    /// `kernel::recover`'s own `invert`, so this test can't be fooled by a
    /// shared bug between the two.
    fn is_invertible(rows: &[Vec<u8>]) -> bool {
        let n = rows.len();
        let mut work = rows.to_vec();
        for col in 0..n {
            let Some(pivot_row) = (col..n).find(|&r| work[r][col] != 0) else {
                return false;
            };
            work.swap(col, pivot_row);
            let pivot_inv = GF.inv(work[col][col]);
            for c in 0..n {
                work[col][c] = GF.mul(work[col][c], pivot_inv);
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
                }
            }
        }
        true
    }

    fn submatrix(table: &CoefficientTable, rows: &[usize], cols: &[usize]) -> Vec<Vec<u8>> {
        rows.iter().map(|&k| cols.iter().map(|&j| table.get(k, j)).collect()).collect()
    }

    /// The two erasure patterns a maintainer found singular under the old,
    /// hand-substituted row-0/row-1 construction. Both must now recover.
    #[test]
    fn reviewer_reported_patterns_are_no_longer_singular() {
        let table = CoefficientTable::build(Mode::Cauchy, 16, 3).unwrap();
        // lose data [1, 14, 15] -> survivor parity rows {0, 1, 2}
        assert!(is_invertible(&submatrix(&table, &[0, 1, 2], &[1, 14, 15])));

        let table = CoefficientTable::build(Mode::Cauchy, 16, 6).unwrap();
        // lose data [1, 14] + parity [0] -> survivor parity rows {1, 2}
        assert!(is_invertible(&submatrix(&table, &[1, 2], &[1, 14])));
    }

    /// Exhaustive MDS check over a small envelope: every combination of P
    /// rows with P columns (P up to the mode's max) must be invertible, not
    /// just the specific patterns above.
    #[test]
    fn every_p_subset_is_invertible_for_a_small_envelope() {
        let nd = 9;
        let np = MAX_PARITY_LEVELS;
        let table = CoefficientTable::build(Mode::Cauchy, nd, np).unwrap();

        fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
            if k == 0 {
                return vec![vec![]];
            }
            if k > n {
                return vec![];
            }
            let mut out = Vec::new();
            for first in 0..n {
                for rest in combinations(n - first - 1, k - 1) {
                    let mut combo = vec![first];
                    combo.extend(rest.into_iter().map(|r| r + first + 1));
                    out.push(combo);
                }
            }
            out
        }

        for p in 1..=np {
            for rows in combinations(np, p) {
                for cols in combinations(nd, p) {
                    assert!(
                        is_invertible(&submatrix(&table, &rows, &cols)),
                        "singular submatrix at rows {rows:?}, cols {cols:?}"
                    );
                }
            }
        }
    }
}
