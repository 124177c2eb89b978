// no_std support
#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Shape mismatch in caller-supplied snapshot data.
///
/// Degenerate-but-well-typed inputs (empty matrices, zero layers where a count
/// is optional) never produce this; only genuinely malformed shapes do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShapeError {
    /// A square matrix was required.
    NotSquare { rows: usize, cols: usize },
    /// A row of a nested-list matrix had the wrong width.
    RaggedRow { row: usize, expected: usize, got: usize },
    /// At least one layer was required.
    EmptyStack,
    /// A layer's matrix did not match the shape of the first layer.
    LayerShape {
        layer: usize,
        expected: (usize, usize),
        got: (usize, usize),
    },
    /// The token sequence length did not match the activation sequence axis.
    TokenCount { expected: usize, got: usize },
    /// Two parallel streams had different layer counts.
    StreamCount { expected: usize, got: usize },
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeError::NotSquare { rows, cols } => {
                write!(f, "expected a square matrix, got {rows}x{cols}")
            }
            ShapeError::RaggedRow { row, expected, got } => {
                write!(f, "row {row} has {got} entries, expected {expected}")
            }
            ShapeError::EmptyStack => write!(f, "expected at least one layer"),
            ShapeError::LayerShape {
                layer,
                expected,
                got,
            } => write!(
                f,
                "layer {layer} is {}x{}, expected {}x{}",
                got.0, got.1, expected.0, expected.1
            ),
            ShapeError::TokenCount { expected, got } => {
                write!(f, "got {got} tokens for a sequence axis of {expected}")
            }
            ShapeError::StreamCount { expected, got } => {
                write!(f, "secondary stream has {got} layers, expected {expected}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ShapeError {}

/// Dense row-major f32 matrix.
///
/// Snapshot container for connectivity matrices, per-layer activations and
/// logits. Built once per capture and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    /// Build from nested rows, validating rectangularity.
    pub fn from_rows(rows_in: &[Vec<f32>]) -> Result<Self, ShapeError> {
        let rows = rows_in.len();
        let cols = rows_in.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows * cols);
        for (i, row) in rows_in.iter().enumerate() {
            if row.len() != cols {
                return Err(ShapeError::RaggedRow {
                    row: i,
                    expected: cols,
                    got: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self { rows, cols, data })
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, v: f32) {
        self.data[r * self.cols + c] = v;
    }

    /// One row as a contiguous slice.
    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mean over all entries; 0.0 for an empty matrix.
    pub fn mean(&self) -> f32 {
        mean(&self.data)
    }

    /// Nested-list copy for JSON-facing payloads (heatmaps etc).
    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        (0..self.rows).map(|r| self.row(r).to_vec()).collect()
    }
}

/// Dense (batch, rows, cols) f32 tensor, row-major within each batch slice.
///
/// Used for per-layer attention captures of shape (batch, query, key).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tensor3 {
    batch: usize,
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Tensor3 {
    pub fn zeros(batch: usize, rows: usize, cols: usize) -> Self {
        Self {
            batch,
            rows,
            cols,
            data: vec![0.0; batch * rows * cols],
        }
    }

    pub fn from_fn(
        batch: usize,
        rows: usize,
        cols: usize,
        mut f: impl FnMut(usize, usize, usize) -> f32,
    ) -> Self {
        let mut data = Vec::with_capacity(batch * rows * cols);
        for b in 0..batch {
            for r in 0..rows {
                for c in 0..cols {
                    data.push(f(b, r, c));
                }
            }
        }
        Self {
            batch,
            rows,
            cols,
            data,
        }
    }

    #[must_use]
    pub fn batch(&self) -> usize {
        self.batch
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, b: usize, r: usize, c: usize) -> f32 {
        self.data[(b * self.rows + r) * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, b: usize, r: usize, c: usize, v: f32) {
        self.data[(b * self.rows + r) * self.cols + c] = v;
    }

    /// Average over the batch axis. A zero-batch tensor averages to zeros.
    pub fn mean_batch(&self) -> Matrix {
        let mut out = Matrix::zeros(self.rows, self.cols);
        if self.batch == 0 {
            return out;
        }
        let inv = 1.0 / self.batch as f32;
        for b in 0..self.batch {
            for r in 0..self.rows {
                for c in 0..self.cols {
                    let v = out.get(r, c) + self.get(b, r, c) * inv;
                    out.set(r, c, v);
                }
            }
        }
        out
    }
}

/// Mean of a slice; 0.0 when empty.
pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

/// Population standard deviation (not sample-corrected); 0.0 when empty.
pub fn population_std(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f32>() / values.len() as f32;
    var.sqrt()
}

/// Linear-interpolation percentile over a copy of `values`; 0.0 when empty.
///
/// rank = pct/100 * (n-1), value interpolated between the two nearest
/// order statistics.
pub fn percentile(values: &[f32], pct: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pct = pct.clamp(0.0, 100.0);
    let rank = (pct / 100.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = rank - lo as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_rejects_ragged_input() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        let err = Matrix::from_rows(&rows).unwrap_err();
        assert_eq!(
            err,
            ShapeError::RaggedRow {
                row: 1,
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn matrix_row_access_is_row_major() {
        let m = Matrix::from_fn(2, 3, |r, c| (r * 3 + c) as f32);
        assert_eq!(m.row(1), &[3.0, 4.0, 5.0]);
        assert_eq!(m.get(1, 2), 5.0);
    }

    #[test]
    fn tensor3_mean_batch_averages_slices() {
        let t = Tensor3::from_fn(2, 2, 2, |b, r, c| if b == 0 { 0.0 } else { (r + c) as f32 });
        let avg = t.mean_batch();
        assert_eq!(avg.get(0, 0), 0.0);
        assert_eq!(avg.get(1, 1), 1.0);
        assert_eq!(avg.get(0, 1), 0.5);
    }

    #[test]
    fn tensor3_zero_batch_averages_to_zeros() {
        let t = Tensor3::zeros(0, 3, 3);
        let avg = t.mean_batch();
        assert_eq!(avg.rows(), 3);
        assert!(avg.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn population_std_matches_hand_computation() {
        // Variance of [1,2,3,4] around 2.5 is 1.25.
        let s = population_std(&[1.0, 2.0, 3.0, 4.0]);
        assert!((s - 1.25f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let values = [0.0, 1.0, 2.0, 3.0];
        assert!((percentile(&values, 0.0) - 0.0).abs() < 1e-6);
        assert!((percentile(&values, 100.0) - 3.0).abs() < 1e-6);
        assert!((percentile(&values, 50.0) - 1.5).abs() < 1e-6);
        // rank = 0.9 * 3 = 2.7 -> between 2.0 and 3.0
        assert!((percentile(&values, 90.0) - 2.7).abs() < 1e-6);
    }

    #[test]
    fn percentile_of_empty_is_zero() {
        assert_eq!(percentile(&[], 90.0), 0.0);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(population_std(&[]), 0.0);
    }
}
