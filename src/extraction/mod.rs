// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Extraction of a single tile of spectra.
//!
//! The pixels of a tile are modelled as `image = A f + noise`, where the
//! columns of the sparse design matrix `A` are PSF spots. The weighted
//! least-squares solution `f` has strongly correlated errors, so it is
//! "decorrelated" with a resolution matrix `R` (Bolton & Schlegel 2010, PASP
//! 122, 248) to produce fluxes with independent errors.

mod design;
mod error;
mod resolution;

pub use error::ExtractionError;

use std::ops::Range;

use log::trace;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::{
    constants::{DEFAULT_MIN_WEIGHT_FRACTION, DEFAULT_REGULARIZE},
    psf::{PixelBox, Psf},
};
use design::{DesignMatrix, FitDiagnostics, NormalEquations};
use resolution::{resolution_band, resolution_from_icov, SymmetricEigen};

/// How the resolution matrix of a tile is formed.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Decorrelation {
    /// Decorrelate all the spectra of a tile together. Every extracted flux has
    /// independent errors, but a spectrum may have signal from its neighbours.
    #[default]
    Full,

    /// Decorrelate each spectrum independently. There is no signal crosstalk
    /// between spectra, but their errors are correlated.
    PerSpectrum,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Added to the diagonal of the normal equations.
    pub regularize: f64,

    /// Flux bins with less than this fraction of the largest bin's weight are
    /// pinned towards zero. 0 disables this.
    pub min_weight_fraction: f64,

    /// Half-width of the stored resolution band.
    pub ndiag: usize,

    pub decorrelation: Decorrelation,

    /// Also work out [`TileDiagnostics`].
    pub full_output: bool,

    /// The fractional error of the PSF model used for the diagnostics. If not
    /// given, the PSF's own is used.
    pub psf_error: Option<f64>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            regularize: DEFAULT_REGULARIZE,
            min_weight_fraction: DEFAULT_MIN_WEIGHT_FRACTION,
            ndiag: 5,
            decorrelation: Decorrelation::Full,
            full_output: false,
            psf_error: None,
        }
    }
}

/// The extracted spectra of a tile, in the tile's own wavelength samples.
#[derive(Debug, Clone)]
pub struct TileExtraction {
    /// Shape `(num_spectra, num_wavelengths)`.
    pub flux: Array2<f64>,

    /// Shape `(num_spectra, num_wavelengths)`.
    pub ivar: Array2<f64>,

    /// Shape `(num_spectra, 2 * ndiag + 1, num_wavelengths)`.
    pub resolution: Array3<f64>,

    /// Only with [`ExtractOptions::full_output`].
    pub diagnostics: Option<TileDiagnostics>,
}

/// How well a tile's solution fits its pixels.
#[derive(Debug, Clone)]
pub struct TileDiagnostics {
    /// The model of the tile's pixels from the deconvolved fluxes. Has the
    /// shape of the pixel box.
    pub model: Array2<f64>,

    /// The fraction of each flux bin's spot that falls on masked pixels or
    /// outside of the pixel box. Shape `(num_spectra, num_wavelengths)`.
    pub pixmask_fraction: Array2<f64>,

    /// The mean `χ²` of the pixels of each flux bin's spot, weighted by the
    /// spot. Pixel variances include the PSF model error. Shape `(num_spectra,
    /// num_wavelengths)`.
    pub chi2pix: Array2<f64>,
}

/// Extract `spectra` at `wavelengths` from the pixels of `image` and `ivar`,
/// which are the detector cut out by `pixel_box`.
///
/// Fluxes are in units of the image per wavelength sample.
pub fn extract_tile(
    image: ArrayView2<f64>,
    ivar: ArrayView2<f64>,
    psf: &dyn Psf,
    spectra: Range<usize>,
    wavelengths: &[f64],
    pixel_box: PixelBox,
    options: &ExtractOptions,
) -> Result<TileExtraction, ExtractionError> {
    if image.dim() != pixel_box.shape() || ivar.dim() != pixel_box.shape() {
        return Err(ExtractionError::TileShape {
            image: image.dim(),
            ivar: ivar.dim(),
            expected: pixel_box.shape(),
        });
    }
    if spectra.is_empty() || wavelengths.is_empty() || pixel_box.is_empty() {
        return Err(ExtractionError::EmptyTile);
    }
    let num_spectra = spectra.len();
    let num_wavelengths = wavelengths.len();

    let design = DesignMatrix::new(psf, spectra, wavelengths, pixel_box)?;
    trace!(
        "Design matrix: {} pixels x {} unknowns",
        design.num_pixels(),
        design.num_unknowns()
    );
    let normal = NormalEquations::new(
        &design,
        image,
        ivar,
        options.regularize,
        options.min_weight_fraction,
    )?;

    let eig = SymmetricEigen::new(normal.matrix.as_ref())?;
    eig.check_rank()?;
    trace!("Condition number: {:e}", eig.condition_number());
    let deconvolved = eig.solve(&normal.rhs);
    let fit = options.full_output.then(|| {
        let psf_error = options.psf_error.unwrap_or_else(|| psf.psf_error());
        FitDiagnostics::new(&design, image, ivar, &deconvolved, psf_error)
    });

    let block_size = match options.decorrelation {
        Decorrelation::Full => None,
        Decorrelation::PerSpectrum => Some(num_wavelengths),
    };
    let resolution = resolution_from_icov(&eig, block_size)?;

    let n = deconvolved.len();
    let flux: Vec<f64> = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| resolution.matrix[(i, j)] * deconvolved[j])
                .sum()
        })
        .collect();

    // Unknowns are in spectrum-major order, which is the row-major order of
    // (spectrum, wavelength) arrays.
    let shape = (num_spectra, num_wavelengths);
    let flux = Array2::from_shape_vec(shape, flux).map_err(|e| ExtractionError::Design(e.to_string()))?;
    let ivar = Array2::from_shape_vec(shape, resolution.ivar)
        .map_err(|e| ExtractionError::Design(e.to_string()))?;
    let resolution = resolution_band(
        resolution.matrix.as_ref(),
        num_spectra,
        num_wavelengths,
        options.ndiag,
    );

    let diagnostics = match fit {
        Some(fit) => {
            let to_array = |v: Vec<f64>, shape: (usize, usize)| {
                Array2::from_shape_vec(shape, v)
                    .map_err(|e| ExtractionError::Design(e.to_string()))
            };
            Some(TileDiagnostics {
                model: to_array(fit.model, pixel_box.shape())?,
                pixmask_fraction: to_array(fit.pixmask_fraction, shape)?,
                chi2pix: to_array(fit.chi2pix, shape)?,
            })
        }
        None => None,
    };

    Ok(TileExtraction {
        flux,
        ivar,
        resolution,
        diagnostics,
    })
}
