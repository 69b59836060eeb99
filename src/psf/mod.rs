// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to abstract PSF models.
//!
//! [`Psf`] is a trait detailing what extraction needs from an optical model:
//! where each spectrum's trace lands on the detector, and the pixel footprint
//! ("spot") of a spectrum at a single wavelength. By making this a trait,
//! extraction doesn't care which concrete model is in use.

mod error;
mod gaussian;

pub use error::PsfError;
pub use gaussian::GaussianPsf;

use std::{fs::File, io::Read, ops::Range, path::Path};

use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::constants::DEFAULT_PSF_ERROR;

/// Supported PSF types.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum PsfType {
    /// Pixel-integrated Gaussian spots on linear traces.
    Gaussian,
}

/// A half-open box of detector pixels, `[xmin, xmax) x [ymin, ymax)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelBox {
    pub xmin: usize,
    pub xmax: usize,
    pub ymin: usize,
    pub ymax: usize,
}

impl PixelBox {
    /// Clamp signed pixel bounds to a detector of shape `(ny, nx)`. Bounds
    /// entirely off the detector produce an empty box.
    pub fn clamped(xmin: i64, xmax: i64, ymin: i64, ymax: i64, (ny, nx): (usize, usize)) -> PixelBox {
        let clamp = |v: i64, hi: usize| v.clamp(0, hi as i64) as usize;
        let xmin = clamp(xmin, nx);
        let ymin = clamp(ymin, ny);
        PixelBox {
            xmin,
            xmax: clamp(xmax, nx).max(xmin),
            ymin,
            ymax: clamp(ymax, ny).max(ymin),
        }
    }

    pub fn nx(&self) -> usize {
        self.xmax - self.xmin
    }

    pub fn ny(&self) -> usize {
        self.ymax - self.ymin
    }

    pub fn num_pixels(&self) -> usize {
        self.nx() * self.ny()
    }

    pub fn is_empty(&self) -> bool {
        self.num_pixels() == 0
    }

    /// The `(ny, nx)` shape of the image cut out by this box.
    pub fn shape(&self) -> (usize, usize) {
        (self.ny(), self.nx())
    }
}

/// The pixel footprint of a single spectrum at a single wavelength, in detector
/// coordinates. A spot may hang off the edge of the detector; those pixels
/// carry no signal.
#[derive(Debug, Clone)]
pub struct Spot {
    /// Detector column of the first column of `weights`.
    pub xmin: i64,

    /// Detector row of the first row of `weights`.
    pub ymin: i64,

    /// The fraction of the spectrum's flux falling into each pixel. The first
    /// dimension is rows (y).
    pub weights: Array2<f64>,
}

impl Spot {
    /// The signed `(xmin, xmax, ymin, ymax)` bounds of the spot.
    pub fn bounds(&self) -> (i64, i64, i64, i64) {
        let (ny, nx) = self.weights.dim();
        (
            self.xmin,
            self.xmin + nx as i64,
            self.ymin,
            self.ymin + ny as i64,
        )
    }

    /// Iterate over the `(y, x, weight)` pixels of this spot that lie within
    /// `pixel_box`. `y` and `x` are detector coordinates.
    pub fn pixels_within(&self, pixel_box: PixelBox) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let (xmin, ymin) = (self.xmin, self.ymin);
        self.weights
            .indexed_iter()
            .filter_map(move |((iy, ix), &weight)| {
                let y = ymin + iy as i64;
                let x = xmin + ix as i64;
                let inside = y >= pixel_box.ymin as i64
                    && y < pixel_box.ymax as i64
                    && x >= pixel_box.xmin as i64
                    && x < pixel_box.xmax as i64;
                inside.then(|| (y as usize, x as usize, weight))
            })
    }
}

/// A trait abstracting PSF models.
pub trait Psf: Sync + Send {
    /// Get the type of PSF.
    fn get_psf_type(&self) -> PsfType;

    /// The number of spectra on the detector.
    fn num_spectra(&self) -> usize;

    /// The `(ny, nx)` shape of the detector.
    fn detector_shape(&self) -> (usize, usize);

    /// The wavelengths over which this model is defined \[Å\].
    fn wavelength_range(&self) -> (f64, f64);

    /// The `(x, y)` detector position of a spectrum's trace at a wavelength.
    fn xy(&self, ispec: usize, wavelength: f64) -> (f64, f64);

    /// The Gaussian-equivalent sigma of a spot along the dispersion direction
    /// \[Å\].
    fn wdisp(&self, ispec: usize, wavelength: f64) -> f64;

    /// The fractional error of the model's spots.
    fn psf_error(&self) -> f64 {
        DEFAULT_PSF_ERROR
    }

    /// The footprint of a spectrum at a wavelength. The weights sum to the
    /// spectrum's total flux contribution per unit flux.
    fn spot(&self, ispec: usize, wavelength: f64) -> Spot;

    /// The smallest box of detector pixels containing the spots of every
    /// requested spectrum over the requested wavelength range, clamped to the
    /// detector. Spectra that don't exist are ignored.
    ///
    /// The default implementation unions the spots at both ends and the middle
    /// of the range, which is exact for traces that are monotonic in
    /// wavelength.
    fn xyrange(&self, spectra: Range<usize>, (wavemin, wavemax): (f64, f64)) -> PixelBox {
        let mut bounds: Option<(i64, i64, i64, i64)> = None;
        for ispec in spectra.start..spectra.end.min(self.num_spectra()) {
            for wavelength in [wavemin, 0.5 * (wavemin + wavemax), wavemax] {
                let (x0, x1, y0, y1) = self.spot(ispec, wavelength).bounds();
                bounds = Some(match bounds {
                    None => (x0, x1, y0, y1),
                    Some((bx0, bx1, by0, by1)) => (bx0.min(x0), bx1.max(x1), by0.min(y0), by1.max(y1)),
                });
            }
        }
        match bounds {
            Some((x0, x1, y0, y1)) => PixelBox::clamped(x0, x1, y0, y1, self.detector_shape()),
            None => PixelBox::default(),
        }
    }

    /// How far a spot extends along the dispersion direction, converted to
    /// wavelength using the local slope of the trace \[Å\].
    fn spot_wavelength_extent(&self, ispec: usize, wavelength: f64) -> f64 {
        let (wavemin, wavemax) = self.wavelength_range();
        let h = 1e-3 * (wavemax - wavemin).abs().max(1.0);
        let (_, y_lo) = self.xy(ispec, wavelength - h);
        let (_, y_hi) = self.xy(ispec, wavelength + h);
        let pixels_per_angstrom = ((y_hi - y_lo) / (2.0 * h)).abs();
        if !(pixels_per_angstrom > 0.0) || !pixels_per_angstrom.is_finite() {
            return 0.0;
        }
        let (spot_ny, _) = self.spot(ispec, wavelength).weights.dim();
        spot_ny as f64 / pixels_per_angstrom
    }
}

/// The serialisable description of a PSF model. PSF files are toml or json,
/// with a `type` key selecting the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PsfConfig {
    Gaussian(GaussianPsf),
}

impl PsfConfig {
    /// Validate the configuration and create a PSF object.
    pub fn into_psf(self) -> Result<Box<dyn Psf>, PsfError> {
        match self {
            PsfConfig::Gaussian(g) => {
                g.validate()?;
                Ok(Box::new(g))
            }
        }
    }

    /// Read a PSF file. The format is determined by the file extension.
    pub fn read(file: &Path) -> Result<PsfConfig, PsfError> {
        debug!("Reading PSF file {}", file.display());
        let ext = file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        let mut contents = String::new();
        match ext.as_deref() {
            Some("toml") => {
                File::open(file)?.read_to_string(&mut contents)?;
                Ok(toml::from_str(&contents)?)
            }
            Some("json") => {
                File::open(file)?.read_to_string(&mut contents)?;
                Ok(serde_json::from_str(&contents)?)
            }
            _ => Err(PsfError::UnsupportedExt {
                file: file.display().to_string(),
            }),
        }
    }
}

/// Read a PSF file and create a PSF object.
pub fn read_psf(file: &Path) -> Result<Box<dyn Psf>, PsfError> {
    PsfConfig::read(file)?.into_psf()
}
