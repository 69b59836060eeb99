// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Extracted spectra, and merging extractions of different spectra.


use std::ops::Range;

use log::debug;
use ndarray::{concatenate, prelude::*};
use thiserror::Error;

use crate::grid::WavelengthGrid;

/// Extracted spectra on a common wavelength grid. Fluxes are per Angstrom.
#[derive(Debug, Clone)]
pub struct ExtractedSpectra {
    /// The index of the first spectrum.
    pub specmin: usize,

    pub wavelengths: WavelengthGrid,

    /// Shape `(num_spectra, num_wavelengths)`.
    pub flux: Array2<f64>,

    /// Shape `(num_spectra, num_wavelengths)`.
    pub ivar: Array2<f64>,

    /// Shape `(num_spectra, 2 * ndiag + 1, num_wavelengths)`. See
    /// [`crate::extraction::TileExtraction`] for the layout.
    pub resolution: Array3<f64>,

    pub diagnostics: Option<Diagnostics>,
}

/// How well the extraction fits the detector image.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    /// The detector image modelled by these spectra.
    pub model: Array2<f64>,

    /// Shape `(num_spectra, num_wavelengths)`. See
    /// [`crate::extraction::TileDiagnostics`].
    pub pixmask_fraction: Array2<f64>,

    /// Shape `(num_spectra, num_wavelengths)`.
    pub chi2pix: Array2<f64>,
}

impl ExtractedSpectra {
    pub fn num_spectra(&self) -> usize {
        self.flux.len_of(Axis(0))
    }

    pub fn ndiag(&self) -> usize {
        self.resolution.len_of(Axis(1)) / 2
    }

    pub fn spectra(&self) -> Range<usize> {
        self.specmin..self.specmin + self.num_spectra()
    }
}

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("No extracted spectra were given to merge")]
    NoInputs,

    #[error("Spectra {first:?} and {second:?} overlap")]
    Overlap {
        first: Range<usize>,
        second: Range<usize>,
    },

    #[error("Spectra {missing:?} are missing")]
    Gap { missing: Range<usize> },

    #[error("Expected spectra 0..{expected} after merging, but got spectra {actual:?}")]
    Coverage {
        expected: usize,
        actual: Range<usize>,
    },

    #[error("Only one of spectra {first:?} and {spectra:?} have diagnostics")]
    DiagnosticsMismatch {
        spectra: Range<usize>,
        first: Range<usize>,
    },

    #[error("Spectra {spectra:?} have a model image of shape {actual:?}, but spectra {first:?} have {expected:?}")]
    ModelShape {
        spectra: Range<usize>,
        first: Range<usize>,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Spectra {spectra:?} have wavelengths {actual}, but spectra {first:?} have {expected}")]
    WavelengthMismatch {
        spectra: Range<usize>,
        first: Range<usize>,
        expected: WavelengthGrid,
        actual: WavelengthGrid,
    },

    #[error("Spectra {spectra:?} have a resolution band with {actual} diagonals, but spectra {first:?} have {expected}")]
    NdiagMismatch {
        spectra: Range<usize>,
        first: Range<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("Couldn't concatenate the extracted spectra: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Concatenate extractions of different spectra along the spectrum axis. The
/// inputs must use the same wavelengths and resolution band, and their spectra
/// must be contiguous and not overlap. If `num_spectra` is given, the merged
/// result must be exactly spectra `0..num_spectra`.
///
/// Either all or none of the inputs have diagnostics. The merged model image is
/// the sum of the inputs' model images.
pub fn merge(
    mut parts: Vec<ExtractedSpectra>,
    num_spectra: Option<usize>,
) -> Result<ExtractedSpectra, MergeError> {
    parts.sort_by_key(|p| p.specmin);
    let first = parts.first().ok_or(MergeError::NoInputs)?;

    for pair in parts.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if b.specmin < a.spectra().end {
            return Err(MergeError::Overlap {
                first: a.spectra(),
                second: b.spectra(),
            });
        }
        if b.specmin > a.spectra().end {
            return Err(MergeError::Gap {
                missing: a.spectra().end..b.specmin,
            });
        }
    }
    for part in &parts[1..] {
        if !part.wavelengths.matches(&first.wavelengths) {
            return Err(MergeError::WavelengthMismatch {
                spectra: part.spectra(),
                first: first.spectra(),
                expected: first.wavelengths,
                actual: part.wavelengths,
            });
        }
        if part.resolution.len_of(Axis(1)) != first.resolution.len_of(Axis(1)) {
            return Err(MergeError::NdiagMismatch {
                spectra: part.spectra(),
                first: first.spectra(),
                expected: first.resolution.len_of(Axis(1)),
                actual: part.resolution.len_of(Axis(1)),
            });
        }
        match (&first.diagnostics, &part.diagnostics) {
            (None, None) => (),
            (Some(a), Some(b)) => {
                if a.model.dim() != b.model.dim() {
                    return Err(MergeError::ModelShape {
                        spectra: part.spectra(),
                        first: first.spectra(),
                        expected: a.model.dim(),
                        actual: b.model.dim(),
                    });
                }
            }
            _ => {
                return Err(MergeError::DiagnosticsMismatch {
                    spectra: part.spectra(),
                    first: first.spectra(),
                })
            }
        }
    }

    let actual: usize = parts.iter().map(|p| p.num_spectra()).sum();
    if let Some(expected) = num_spectra {
        // The parts are contiguous by now.
        if first.specmin != 0 || actual != expected {
            return Err(MergeError::Coverage {
                expected,
                actual: first.specmin..first.specmin + actual,
            });
        }
    }
    debug!(
        "Merging {} extractions into spectra {}..{}",
        parts.len(),
        first.specmin,
        first.specmin + actual
    );

    let flux = concatenate(
        Axis(0),
        &parts.iter().map(|p| p.flux.view()).collect::<Vec<_>>(),
    )?;
    let ivar = concatenate(
        Axis(0),
        &parts.iter().map(|p| p.ivar.view()).collect::<Vec<_>>(),
    )?;
    let resolution = concatenate(
        Axis(0),
        &parts.iter().map(|p| p.resolution.view()).collect::<Vec<_>>(),
    )?;

    let diagnostics = match &first.diagnostics {
        None => None,
        Some(d) => {
            let all: Vec<&Diagnostics> = parts.iter().filter_map(|p| p.diagnostics.as_ref()).collect();
            let mut model = Array2::zeros(d.model.dim());
            for part in &all {
                model += &part.model;
            }
            let pixmask_fraction = concatenate(
                Axis(0),
                &all.iter().map(|d| d.pixmask_fraction.view()).collect::<Vec<_>>(),
            )?;
            let chi2pix = concatenate(
                Axis(0),
                &all.iter().map(|d| d.chi2pix.view()).collect::<Vec<_>>(),
            )?;
            Some(Diagnostics {
                model,
                pixmask_fraction,
                chi2pix,
            })
        }
    };

    Ok(ExtractedSpectra {
        specmin: first.specmin,
        wavelengths: first.wavelengths,
        flux,
        ivar,
        resolution,
        diagnostics,
    })
}
