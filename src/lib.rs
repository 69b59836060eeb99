// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! 2D PSF spectral extraction for multi-object spectrograph images.
//!
//! Given a detector image, its inverse variances and a PSF model, spectra are
//! extracted in overlapping tiles and stitched together. Each tile is a
//! weighted least-squares solve, decorrelated into fluxes with independent
//! errors and a banded resolution matrix (Bolton & Schlegel 2010).

pub mod constants;
pub mod extraction;
pub mod grid;
pub mod io;
pub mod psf;
pub mod simulate;
pub mod spectra;
pub mod tiling;

mod cli;
mod params;

#[cfg(test)]
mod tests;

use crossbeam_utils::atomic::AtomicCell;

/// Are progress bars being drawn? This should only ever be enabled by CLI
/// code.
static PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);

// Re-exports.
pub use cli::{Ex2d, Ex2dError};
pub use extraction::{
    extract_tile, Decorrelation, ExtractOptions, ExtractionError, TileDiagnostics, TileExtraction,
};
pub use grid::WavelengthGrid;
pub use io::DetectorImage;
pub use psf::{GaussianPsf, PixelBox, Psf, Spot};
pub use spectra::{Diagnostics, ExtractedSpectra};
pub use tiling::{ExtractionJob, TilingError};
