// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The sparse design matrix of a tile and its weighted normal equations.

use std::ops::Range;

use faer::{
    sparse::{SparseColMat, Triplet},
    Mat,
};
use ndarray::prelude::*;

use super::ExtractionError;
use crate::psf::{PixelBox, Psf};

/// The forward model of a tile. Rows are the pixels of the tile's box
/// (`(y - ymin) * nx + (x - xmin)`), columns are `(spectrum, wavelength)` pairs
/// in spectrum-major order (`ispec * nwave + iwave`).
pub(crate) struct DesignMatrix {
    pub(crate) matrix: SparseColMat<usize, f64>,
}

impl DesignMatrix {
    /// Assemble the design matrix from PSF spots. Spot pixels outside the box
    /// contribute nothing.
    pub(crate) fn new(
        psf: &dyn Psf,
        spectra: Range<usize>,
        wavelengths: &[f64],
        pixel_box: PixelBox,
    ) -> Result<DesignMatrix, ExtractionError> {
        let nwave = wavelengths.len();
        let nx = pixel_box.nx();
        let mut triplets = vec![];
        for (i, ispec) in spectra.clone().enumerate() {
            for (j, &wavelength) in wavelengths.iter().enumerate() {
                let col = i * nwave + j;
                let spot = psf.spot(ispec, wavelength);
                triplets.extend(
                    spot.pixels_within(pixel_box)
                        .filter(|&(_, _, weight)| weight != 0.0)
                        .map(|(y, x, weight)| {
                            let row = (y - pixel_box.ymin) * nx + (x - pixel_box.xmin);
                            Triplet::new(row, col, weight)
                        }),
                );
            }
        }

        DesignMatrix::from_triplets(pixel_box.num_pixels(), spectra.len() * nwave, &triplets)
    }

    pub(crate) fn from_triplets(
        num_pixels: usize,
        num_unknowns: usize,
        triplets: &[Triplet<usize, usize, f64>],
    ) -> Result<DesignMatrix, ExtractionError> {
        let matrix = SparseColMat::try_new_from_triplets(num_pixels, num_unknowns, triplets)
            .map_err(|e| ExtractionError::Design(format!("{e:?}")))?;
        Ok(DesignMatrix { matrix })
    }

    pub(crate) fn num_pixels(&self) -> usize {
        self.matrix.nrows()
    }

    pub(crate) fn num_unknowns(&self) -> usize {
        self.matrix.ncols()
    }

    /// `A x` for one value per unknown.
    pub(crate) fn apply(&self, x: &[f64]) -> Vec<f64> {
        let col_ptr = self.matrix.symbolic().col_ptr();
        let row_idx = self.matrix.symbolic().row_idx();
        let values = self.matrix.val();
        let mut out = vec![0.0; self.num_pixels()];
        for (c, &xc) in x.iter().enumerate() {
            for k in col_ptr[c]..col_ptr[c + 1] {
                out[row_idx[k]] += values[k] * xc;
            }
        }
        out
    }

    /// `Aᵗ v` for one value per pixel.
    pub(crate) fn apply_transpose(&self, v: &[f64]) -> Vec<f64> {
        let col_ptr = self.matrix.symbolic().col_ptr();
        let row_idx = self.matrix.symbolic().row_idx();
        let values = self.matrix.val();
        (0..self.num_unknowns())
            .map(|c| {
                (col_ptr[c]..col_ptr[c + 1])
                    .map(|k| values[k] * v[row_idx[k]])
                    .sum()
            })
            .collect()
    }
}

fn is_good_pixel(value: f64, weight: f64) -> bool {
    weight > 0.0 && weight.is_finite() && value.is_finite()
}

/// `matrix = Aᵗ W A + D` and `rhs = Aᵗ W image`, where `W` is the diagonal of
/// pixel inverse variances and `D` is the diagonal regularisation.
pub(crate) struct NormalEquations {
    pub(crate) matrix: Mat<f64>,
    pub(crate) rhs: Vec<f64>,
}

impl NormalEquations {
    /// Pixels with non-positive or non-finite inverse variance, or non-finite
    /// values, are ignored.
    ///
    /// The flux weight of unknown `c` is `Σ_p w_p A_pc`. Unknowns whose flux
    /// weight is below `min_weight_fraction` times the largest flux weight have
    /// their diagonal raised to that floor; all other unknowns have
    /// `regularize` added to their diagonal.
    pub(crate) fn new(
        design: &DesignMatrix,
        image: ArrayView2<f64>,
        ivar: ArrayView2<f64>,
        regularize: f64,
        min_weight_fraction: f64,
    ) -> Result<NormalEquations, ExtractionError> {
        let n = design.num_unknowns();
        let mut matrix = Mat::<f64>::zeros(n, n);
        let mut rhs = vec![0.0; n];
        let mut flux_weight = vec![0.0; n];

        // The columns of the transpose are the rows (pixels) of the design
        // matrix.
        let pixels = design
            .matrix
            .as_ref()
            .transpose()
            .to_col_major()
            .map_err(|e| ExtractionError::Design(format!("{e:?}")))?;
        let col_ptr = pixels.symbolic().col_ptr();
        let row_idx = pixels.symbolic().row_idx();
        let values = pixels.val();

        for (p, (&value, &weight)) in image.iter().zip(ivar.iter()).enumerate() {
            if !is_good_pixel(value, weight) {
                continue;
            }
            let range = col_ptr[p]..col_ptr[p + 1];
            let unknowns = &row_idx[range.clone()];
            let a = &values[range];
            for (k, (&c1, &a1)) in unknowns.iter().zip(a).enumerate() {
                rhs[c1] += weight * a1 * value;
                flux_weight[c1] += weight * a1;
                for (&c2, &a2) in unknowns[k..].iter().zip(&a[k..]) {
                    let v = weight * a1 * a2;
                    matrix[(c1, c2)] += v;
                    if c1 != c2 {
                        matrix[(c2, c1)] += v;
                    }
                }
            }
        }

        let floor = min_weight_fraction * flux_weight.iter().copied().fold(0.0, f64::max);
        for (c, &w) in flux_weight.iter().enumerate() {
            matrix[(c, c)] += if w < floor { floor - w } else { regularize };
        }

        Ok(NormalEquations { matrix, rhs })
    }
}

/// How well the deconvolved fluxes of a tile describe its pixels.
pub(crate) struct FitDiagnostics {
    /// `A f` for every pixel of the box.
    pub(crate) model: Vec<f64>,

    /// For each unknown, the fraction of its spot that isn't on a good pixel
    /// of the box.
    pub(crate) pixmask_fraction: Vec<f64>,

    /// For each unknown, the mean `χ²` of the good pixels of its spot,
    /// weighted by the spot.
    pub(crate) chi2pix: Vec<f64>,
}

impl FitDiagnostics {
    /// `flux` is the deconvolved solution, one value per unknown. The
    /// variance of each pixel is its measured variance plus
    /// `(psf_error * model)²`.
    pub(crate) fn new(
        design: &DesignMatrix,
        image: ArrayView2<f64>,
        ivar: ArrayView2<f64>,
        flux: &[f64],
        psf_error: f64,
    ) -> FitDiagnostics {
        let model = design.apply(flux);

        let num_pixels = design.num_pixels();
        let mut good = vec![0.0; num_pixels];
        let mut chi2 = vec![0.0; num_pixels];
        for (p, ((&value, &weight), &m)) in image.iter().zip(ivar.iter()).zip(&model).enumerate() {
            if !is_good_pixel(value, weight) {
                continue;
            }
            // The tiny offset keeps pixels without any model finite.
            let model_ivar = (m * psf_error + 1e-32).powi(-2);
            let total_ivar = if model_ivar > 0.0 {
                1.0 / (1.0 / model_ivar + 1.0 / weight)
            } else {
                weight
            };
            good[p] = 1.0;
            chi2[p] = (value - m).powi(2) * total_ivar;
        }

        let coverage = design.apply_transpose(&good);
        let pixmask_fraction = coverage.iter().map(|&c| 1.0 - c).collect();
        let chi2pix = design
            .apply_transpose(&chi2)
            .into_iter()
            .zip(&coverage)
            .map(|(c, &w)| if w > 0.0 { c / w } else { 0.0 })
            .collect();

        FitDiagnostics {
            model,
            pixmask_fraction,
            chi2pix,
        }
    }
}
