// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with planning and running a tiled extraction.

use std::ops::Range;

use thiserror::Error;

use crate::extraction::ExtractionError;

/// Problems with an extraction job that are caught before any tile is
/// extracted.
#[derive(Error, Debug)]
pub enum JobConfigError {
    #[error("The bundle size must be at least 1")]
    ZeroBundleSize,

    #[error("No spectra were requested")]
    NoSpectra,

    #[error("Spectra {start}..{end} were requested, but the PSF only has {num_spectra} spectra")]
    SpectraOutOfRange {
        start: usize,
        end: usize,
        num_spectra: usize,
    },

    #[error("The wavelength step of each tile ({wavelength_step} Å) must be a positive whole number of wavelength samples ({step} Å)")]
    WindowNotMultiple { wavelength_step: f64, step: f64 },

    #[error("The wavelength grid has {num_samples} samples, which isn't a multiple of the {window_samples} samples in each tile; adjust the wavelength range or the wavelength step")]
    RangeNotDivisible {
        num_samples: usize,
        window_samples: usize,
    },

    #[error("The image has shape {image:?} and its inverse variance has shape {ivar:?}, but the PSF's detector has shape {detector:?}")]
    ImageShape {
        image: (usize, usize),
        ivar: (usize, usize),
        detector: (usize, usize),
    },

    #[error("The regularisation must be non-negative and finite, got {0}")]
    NegativeRegularisation(f64),

    #[error("The minimum weight fraction must be non-negative and finite, got {0}")]
    NegativeMinWeight(f64),

    #[error("The tile border must be non-negative and finite, got {0} Å")]
    NegativeBorder(f64),

    #[error("The PSF model error must be non-negative and finite, got {0}")]
    NegativePsfError(f64),
}

#[derive(Error, Debug)]
pub enum TilingError {
    #[error(transparent)]
    Config(#[from] JobConfigError),

    #[error("Extracting spectra {spectra:?} over {wavemin}..{wavemax} Å failed: {source}")]
    Tile {
        spectra: Range<usize>,
        wavemin: f64,
        wavemax: f64,
        #[source]
        source: ExtractionError,
    },
}
