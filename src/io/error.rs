// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with reading and writing files.

use thiserror::Error;

use super::fits::FitsError;
use crate::grid::GridError;

#[derive(Error, Debug)]
pub enum ReadError {
    #[error(transparent)]
    Fits(#[from] FitsError),

    #[error("The image in {file} has shape {image:?}, but its inverse variance has shape {ivar:?}")]
    ImageShapes {
        file: String,
        image: (usize, usize),
        ivar: (usize, usize),
    },

    #[error("{file} has no image in its primary HDU or an 'IMAGE' HDU")]
    NoImage { file: String },

    #[error("{file} doesn't describe a valid wavelength grid: {err}")]
    Grid { file: String, err: GridError },
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error(transparent)]
    Fitsio(#[from] fitsio::errors::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
