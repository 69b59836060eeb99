// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A PSF of pixel-integrated, elliptical Gaussian spots on linear traces.
//!
//! Spectrum `i` has its trace at
//!
//! `x = x0 + i * fiber_spacing + (i / bundle_size) * bundle_gap + x_slope * (w - wavemin)`
//!
//! `y = y0 + (w - wavemin) / angstroms_per_pixel`
//!
//! and its spot is the product of two 1D Gaussians integrated over each pixel.
//! Pixel `j` covers `[j - 0.5, j + 0.5)`.

use std::f64::consts::SQRT_2;

use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erf;

use super::{Psf, PsfError, PsfType, Spot};
use crate::constants::{DEFAULT_GAUSSIAN_NSIGMA, DEFAULT_PSF_ERROR};

fn default_nsigma() -> f64 {
    DEFAULT_GAUSSIAN_NSIGMA
}

fn default_psf_error() -> f64 {
    DEFAULT_PSF_ERROR
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianPsf {
    /// The number of spectra on the detector.
    pub num_spectra: usize,

    /// The number of detector columns.
    pub npix_x: usize,

    /// The number of detector rows.
    pub npix_y: usize,

    /// The lower end of the wavelength range \[Å\].
    pub wavemin: f64,

    /// The upper end of the wavelength range \[Å\].
    pub wavemax: f64,

    /// The column of spectrum 0 at `wavemin`.
    pub x0: f64,

    /// The row of every trace at `wavemin`.
    pub y0: f64,

    /// Columns between adjacent spectra.
    pub fiber_spacing: f64,

    /// Spectra per bundle. Adjacent bundles are separated by an extra
    /// `bundle_gap` columns.
    #[serde(default)]
    pub bundle_size: Option<usize>,

    #[serde(default)]
    pub bundle_gap: f64,

    /// Dispersion \[Å / pixel\].
    pub angstroms_per_pixel: f64,

    /// How far traces drift in x per Angstrom \[pixels / Å\].
    #[serde(default)]
    pub x_slope: f64,

    /// Spot sigma across the dispersion direction \[pixels\].
    pub sigma_x: f64,

    /// Spot sigma along the dispersion direction \[pixels\].
    pub sigma_y: f64,

    /// Spots extend this many sigmas from their centre.
    #[serde(default = "default_nsigma")]
    pub nsigma: f64,

    /// The fractional error of the model.
    #[serde(default = "default_psf_error")]
    pub psf_error: f64,
}

impl GaussianPsf {
    pub fn validate(&self) -> Result<(), PsfError> {
        if self.num_spectra == 0 {
            return Err(PsfError::NoSpectra);
        }
        if self.npix_x == 0 || self.npix_y == 0 {
            return Err(PsfError::NoPixels {
                npix_x: self.npix_x,
                npix_y: self.npix_y,
            });
        }
        for (param, value) in [
            ("wavemin", self.wavemin),
            ("wavemax", self.wavemax),
            ("x0", self.x0),
            ("y0", self.y0),
            ("bundle_gap", self.bundle_gap),
            ("x_slope", self.x_slope),
        ] {
            if !value.is_finite() {
                return Err(PsfError::NotFinite { param, value });
            }
        }
        if self.wavemax <= self.wavemin {
            return Err(PsfError::BadWavelengthRange {
                wavemin: self.wavemin,
                wavemax: self.wavemax,
            });
        }
        for (param, value) in [
            ("fiber_spacing", self.fiber_spacing),
            ("angstroms_per_pixel", self.angstroms_per_pixel),
            ("sigma_x", self.sigma_x),
            ("sigma_y", self.sigma_y),
            ("nsigma", self.nsigma),
        ] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(PsfError::NotPositive { param, value });
            }
        }
        if !(self.psf_error >= 0.0) || !self.psf_error.is_finite() {
            return Err(PsfError::Negative {
                param: "psf_error",
                value: self.psf_error,
            });
        }
        if self.bundle_size == Some(0) {
            return Err(PsfError::NotPositive {
                param: "bundle_size",
                value: 0.0,
            });
        }
        Ok(())
    }

    fn trace_x(&self, ispec: usize, wavelength: f64) -> f64 {
        let bundle_offset = match self.bundle_size {
            Some(bundle_size) => (ispec / bundle_size) as f64 * self.bundle_gap,
            None => 0.0,
        };
        self.x0
            + ispec as f64 * self.fiber_spacing
            + bundle_offset
            + self.x_slope * (wavelength - self.wavemin)
    }

    fn trace_y(&self, wavelength: f64) -> f64 {
        self.y0 + (wavelength - self.wavemin) / self.angstroms_per_pixel
    }
}

/// The fraction of a unit Gaussian falling into each of `n` pixels, starting
/// with pixel `start`.
fn integrated_gaussian(start: i64, n: usize, centre: f64, sigma: f64) -> Array1<f64> {
    let scale = 1.0 / (SQRT_2 * sigma);
    Array1::from_shape_fn(n, |i| {
        let p = (start + i as i64) as f64;
        0.5 * (erf((p + 0.5 - centre) * scale) - erf((p - 0.5 - centre) * scale))
    })
}

impl Psf for GaussianPsf {
    fn get_psf_type(&self) -> PsfType {
        PsfType::Gaussian
    }

    fn num_spectra(&self) -> usize {
        self.num_spectra
    }

    fn detector_shape(&self) -> (usize, usize) {
        (self.npix_y, self.npix_x)
    }

    fn wavelength_range(&self) -> (f64, f64) {
        (self.wavemin, self.wavemax)
    }

    fn xy(&self, ispec: usize, wavelength: f64) -> (f64, f64) {
        (self.trace_x(ispec, wavelength), self.trace_y(wavelength))
    }

    fn wdisp(&self, _ispec: usize, _wavelength: f64) -> f64 {
        self.sigma_y * self.angstroms_per_pixel
    }

    fn psf_error(&self) -> f64 {
        self.psf_error
    }

    fn spot(&self, ispec: usize, wavelength: f64) -> Spot {
        let (x, y) = self.xy(ispec, wavelength);
        let half_x = (self.nsigma * self.sigma_x).ceil() as i64;
        let half_y = (self.nsigma * self.sigma_y).ceil() as i64;
        let xmin = x.round() as i64 - half_x;
        let ymin = y.round() as i64 - half_y;
        let nx = (2 * half_x + 1) as usize;
        let ny = (2 * half_y + 1) as usize;

        let x_profile = integrated_gaussian(xmin, nx, x, self.sigma_x);
        let y_profile = integrated_gaussian(ymin, ny, y, self.sigma_y);
        let mut weights = Array2::from_shape_fn((ny, nx), |(iy, ix)| y_profile[iy] * x_profile[ix]);
        // The truncated tails are redistributed so that the spot carries all
        // of the flux.
        let total = weights.sum();
        if total > 0.0 {
            weights /= total;
        }

        Spot {
            xmin,
            ymin,
            weights,
        }
    }
}
