// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Eigendecomposition of the normal equations and spectral decorrelation
//! (Bolton & Schlegel 2010).

use faer::{linalg::matmul::matmul, Accum, Mat, MatRef, Par, Side};
use ndarray::prelude::*;

use super::ExtractionError;
use crate::constants::{EIGEN_CLAMP_THRESHOLD, RANK_TOLERANCE};

/// Which function of the eigenvalues [`SymmetricEigen::compose`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EigenFunction {
    Sqrt,
    Inverse,
    InverseSqrt,
}

/// `M = V diag(values) Vᵗ` for a symmetric `M`.
pub(crate) struct SymmetricEigen {
    pub(crate) values: Vec<f64>,
    pub(crate) vectors: Mat<f64>,
}

impl SymmetricEigen {
    /// Decompose `m`, which is symmetrised first to remove rounding
    /// asymmetries.
    pub(crate) fn new(m: MatRef<f64>) -> Result<SymmetricEigen, ExtractionError> {
        let n = m.nrows();
        let symmetric = Mat::from_fn(n, n, |i, j| 0.5 * (m[(i, j)] + m[(j, i)]));
        let eig = symmetric
            .as_ref()
            .self_adjoint_eigen(Side::Lower)
            .map_err(|e| ExtractionError::Eigendecomposition(format!("{e:?}")))?;

        let diag = eig.S();
        let values: Vec<f64> = (0..diag.dim()).map(|i| diag[i]).collect();
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(ExtractionError::Eigendecomposition(format!(
                "non-finite eigenvalue {bad}"
            )));
        }
        let u = eig.U();
        let vectors = Mat::from_fn(u.nrows(), u.ncols(), |i, j| u[(i, j)]);

        Ok(SymmetricEigen { values, vectors })
    }

    pub(crate) fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub(crate) fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub(crate) fn condition_number(&self) -> f64 {
        self.max() / self.min()
    }

    /// The matrix must be positive definite to working precision.
    pub(crate) fn check_rank(&self) -> Result<(), ExtractionError> {
        let (min, max) = (self.min(), self.max());
        if !(max > 0.0) || min <= max * RANK_TOLERANCE {
            return Err(ExtractionError::RankDeficient { min, max });
        }
        Ok(())
    }

    /// `V diag(f(values)) Vᵗ`. Small eigenvalues are clamped to keep the
    /// result finite.
    pub(crate) fn compose(&self, function: EigenFunction) -> Mat<f64> {
        let max = self.max();
        let scale: Vec<f64> = match function {
            EigenFunction::Sqrt => {
                let minval = max.sqrt() * EIGEN_CLAMP_THRESHOLD;
                self.values
                    .iter()
                    .map(|&w| {
                        let s = w.max(0.0).sqrt();
                        if s > minval {
                            s
                        } else {
                            minval
                        }
                    })
                    .collect()
            }
            EigenFunction::Inverse => {
                let minval = max * EIGEN_CLAMP_THRESHOLD;
                self.values
                    .iter()
                    .map(|&w| if w > minval { 1.0 / w } else { 1.0 / minval })
                    .collect()
            }
            EigenFunction::InverseSqrt => {
                let minval = max.sqrt() * EIGEN_CLAMP_THRESHOLD;
                self.values
                    .iter()
                    .map(|&w| {
                        let s = w.max(0.0).sqrt();
                        if s > minval {
                            1.0 / s
                        } else {
                            1.0 / minval
                        }
                    })
                    .collect()
            }
        };

        let n = self.vectors.nrows();
        let scaled = Mat::from_fn(n, n, |i, j| self.vectors[(i, j)] * scale[j]);
        let mut out = Mat::<f64>::zeros(n, n);
        matmul(
            out.as_mut(),
            Accum::Replace,
            scaled.as_ref(),
            self.vectors.as_ref().transpose(),
            1.0,
            Par::Seq,
        );
        out
    }

    /// `V diag(1 / values) Vᵗ rhs`.
    pub(crate) fn solve(&self, rhs: &[f64]) -> Vec<f64> {
        let n = self.vectors.nrows();
        let projected: Vec<f64> = (0..n)
            .map(|j| {
                let dot: f64 = (0..n).map(|i| self.vectors[(i, j)] * rhs[i]).sum();
                dot / self.values[j]
            })
            .collect();
        (0..n)
            .map(|i| (0..n).map(|j| self.vectors[(i, j)] * projected[j]).sum())
            .collect()
    }
}

/// The decorrelated products of a tile solve.
pub(crate) struct Resolution {
    /// Rows sum to 1.
    pub(crate) matrix: Mat<f64>,

    /// The inverse variance of each decorrelated flux.
    pub(crate) ivar: Vec<f64>,
}

/// Get the resolution matrix from the eigendecomposition of the inverse
/// covariance.
///
/// With `block_size = None`, `R ∝ C^-1/2` for the whole tile. Otherwise the
/// covariance is split into diagonal blocks of `block_size` unknowns (one per
/// spectrum) and each block is decorrelated by itself; signal no longer leaks
/// between spectra, but their noise is correlated.
///
/// Each row of `R` is normalised to sum to 1. The decorrelated flux
/// `R f` then has uncorrelated errors with inverse variance `norm²`, where
/// `norm` is the un-normalised row sum.
pub(crate) fn resolution_from_icov(
    eig: &SymmetricEigen,
    block_size: Option<usize>,
) -> Result<Resolution, ExtractionError> {
    let mut sqrt_icov = match block_size {
        None => eig.compose(EigenFunction::Sqrt),
        Some(block_size) => {
            let cov = eig.compose(EigenFunction::Inverse);
            let n = cov.nrows();
            let mut sqrt_icov = Mat::<f64>::zeros(n, n);
            for start in (0..n).step_by(block_size.max(1)) {
                let len = block_size.min(n - start);
                let block = cov.as_ref().submatrix(start, start, len, len);
                let block_eig = SymmetricEigen::new(block)?;
                let block_sqrt_icov = block_eig.compose(EigenFunction::InverseSqrt);
                for i in 0..len {
                    for j in 0..len {
                        sqrt_icov[(start + i, start + j)] = block_sqrt_icov[(i, j)];
                    }
                }
            }
            sqrt_icov
        }
    };

    let n = sqrt_icov.nrows();
    let mut ivar = Vec::with_capacity(n);
    for row in 0..n {
        let sum: f64 = (0..n).map(|col| sqrt_icov[(row, col)]).sum();
        if !(sum > 0.0) || !sum.is_finite() {
            return Err(ExtractionError::Normalisation { row, sum });
        }
        for col in 0..n {
            sqrt_icov[(row, col)] /= sum;
        }
        ivar.push(sum * sum);
    }

    Ok(Resolution {
        matrix: sqrt_icov,
        ivar,
    })
}

/// Store the diagonal block of each spectrum as `2 * ndiag + 1` diagonals:
/// `band[[i, d, j]] = R_i[j - ndiag + d, j]`, with rows outside of the block
/// set to zero.
pub(crate) fn resolution_band(
    resolution: MatRef<f64>,
    num_spectra: usize,
    num_wavelengths: usize,
    ndiag: usize,
) -> Array3<f64> {
    let mut band = Array3::zeros((num_spectra, 2 * ndiag + 1, num_wavelengths));
    for ((i, d, j), b) in band.indexed_iter_mut() {
        let row = (j + d) as i64 - ndiag as i64;
        if row < 0 || row >= num_wavelengths as i64 {
            continue;
        }
        let offset = i * num_wavelengths;
        *b = resolution[(offset + row as usize, offset + j)];
    }
    band
}
