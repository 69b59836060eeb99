// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with PSF models.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PsfError {
    #[error("PSF parameter '{param}' must be positive, but it is {value}")]
    NotPositive { param: &'static str, value: f64 },

    #[error("PSF parameter '{param}' must be non-negative and finite, but it is {value}")]
    Negative { param: &'static str, value: f64 },

    #[error("PSF parameter '{param}' must be finite, but it is {value}")]
    NotFinite { param: &'static str, value: f64 },

    #[error("The PSF has no spectra")]
    NoSpectra,

    #[error("The PSF detector has no pixels ({npix_x} x {npix_y})")]
    NoPixels { npix_x: usize, npix_y: usize },

    #[error("The PSF wavelength range {wavemin}..{wavemax} is empty")]
    BadWavelengthRange { wavemin: f64, wavemax: f64 },

    #[error("PSF file '{file}' doesn't have a recognised file extension! Valid extensions are: toml, json")]
    UnsupportedExt { file: String },

    #[error("Couldn't decode the PSF toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Couldn't decode the PSF json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
