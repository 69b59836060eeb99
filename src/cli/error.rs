// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all ex2d-related errors. This should be the *only* error
//! enum that is publicly visible.

use thiserror::Error;

use super::{
    common::SpectraArgsError, extract::ExtractArgsError, merge::MergeArgsError,
    simulate::SimulateArgsError,
};
use crate::{
    io::{FitsError, ReadError, WriteError},
    params::{ExtractError, MergeFilesError, SimulateError},
    psf::PsfError,
    simulate::NoiseError,
    tiling::{JobConfigError, TilingError},
};

/// The *only* publicly visible error from ex2d. Errors are grouped by what the
/// user can do about them.
#[derive(Error, Debug)]
pub enum Ex2dError {
    /// Bad or inconsistent arguments; nothing has been computed.
    #[error("{0}")]
    Config(String),

    /// An error related to the PSF file or model.
    #[error("{0}\n\nCheck the PSF file; every model needs a 'type' key.")]
    Psf(String),

    /// A tile couldn't be extracted.
    #[error("{0}\n\nThis can usually be fixed by using regularisation (--regularize), a larger minimum weight fraction (--min-weight-fraction) or different tiling (--bundle-size, --wavelength-step, --border).")]
    Extraction(String),

    /// Extracted spectra couldn't be merged.
    #[error("{0}")]
    Merge(String),

    /// An error related to argument files.
    #[error("{0}")]
    ArgFile(String),

    /// A cfitsio error. Because these are usually quite spartan, some
    /// suggestions are provided here.
    #[error("cfitsio error: {0}\n\nIf you don't know what this means, try turning up verbosity (-v or -vv) and maybe disabling progress bars.")]
    Cfitsio(String),

    /// A generic error that can't be clarified further, e.g. IO errors.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

// Binary sub-command errors.

impl From<SpectraArgsError> for Ex2dError {
    fn from(e: SpectraArgsError) -> Self {
        match e {
            SpectraArgsError::Psf(e) => Self::from(e),
            SpectraArgsError::NoPsf | SpectraArgsError::PsfDoesntExist(_) => {
                Self::Psf(e.to_string())
            }
            SpectraArgsError::SpecminTooBig { .. }
            | SpectraArgsError::NoSpectra
            | SpectraArgsError::TooManySpectra { .. }
            | SpectraArgsError::NoWavelengths
            | SpectraArgsError::BadWavelengths(_)
            | SpectraArgsError::Grid(_) => Self::Config(e.to_string()),
        }
    }
}

impl From<ExtractArgsError> for Ex2dError {
    fn from(e: ExtractArgsError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<SimulateArgsError> for Ex2dError {
    fn from(e: SimulateArgsError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<MergeArgsError> for Ex2dError {
    fn from(e: MergeArgsError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<ExtractError> for Ex2dError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::Read(e) => Self::from(e),
            ExtractError::Tiling(e) => Self::from(e),
            ExtractError::Write(e) => Self::from(e),
        }
    }
}

impl From<SimulateError> for Ex2dError {
    fn from(e: SimulateError) -> Self {
        match e {
            SimulateError::Noise(e) => Self::from(e),
            SimulateError::Write(e) => Self::from(e),
        }
    }
}

impl From<MergeFilesError> for Ex2dError {
    fn from(e: MergeFilesError) -> Self {
        match e {
            MergeFilesError::Read(e) => Self::from(e),
            MergeFilesError::Merge(e) => Self::Merge(e.to_string()),
            MergeFilesError::Write(e) => Self::from(e),
        }
    }
}

// Library errors.

impl From<PsfError> for Ex2dError {
    fn from(e: PsfError) -> Self {
        Self::Psf(e.to_string())
    }
}

impl From<JobConfigError> for Ex2dError {
    fn from(e: JobConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<TilingError> for Ex2dError {
    fn from(e: TilingError) -> Self {
        match e {
            TilingError::Config(e) => Self::from(e),
            TilingError::Tile { .. } => Self::Extraction(e.to_string()),
        }
    }
}

impl From<NoiseError> for Ex2dError {
    fn from(e: NoiseError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<ReadError> for Ex2dError {
    fn from(e: ReadError) -> Self {
        let s = e.to_string();
        match e {
            ReadError::Fits(FitsError::Open { .. } | FitsError::Fitsio { .. }) => {
                Self::Cfitsio(s)
            }
            ReadError::Fits(_)
            | ReadError::ImageShapes { .. }
            | ReadError::NoImage { .. }
            | ReadError::Grid { .. } => Self::Generic(s),
        }
    }
}

impl From<WriteError> for Ex2dError {
    fn from(e: WriteError) -> Self {
        let s = e.to_string();
        match e {
            WriteError::Fitsio(_) => Self::Cfitsio(s),
            WriteError::IO(_) => Self::Generic(s),
        }
    }
}

impl From<std::io::Error> for Ex2dError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}
