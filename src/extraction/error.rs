// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with extracting a single tile.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("The tile image has shape {image:?} and its inverse variance has shape {ivar:?}, but the pixel box has shape {expected:?}")]
    TileShape {
        image: (usize, usize),
        ivar: (usize, usize),
        expected: (usize, usize),
    },

    #[error("The tile has no spectra or no wavelengths")]
    EmptyTile,

    #[error("Couldn't assemble the design matrix: {0}")]
    Design(String),

    #[error("Eigendecomposition of the normal equations failed: {0}")]
    Eigendecomposition(String),

    #[error("The normal equations are rank deficient (smallest eigenvalue {min:e}, largest eigenvalue {max:e}); try increasing the regularisation or the tile border")]
    RankDeficient { min: f64, max: f64 },

    #[error("Row {row} of the resolution matrix can't be normalised (row sum {sum:e})")]
    Normalisation { row: usize, sum: f64 },
}
