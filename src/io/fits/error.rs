// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with FITS files.

use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitsError {
    #[error("{source_file}:{source_line}: Couldn't open {fits_filename}: {fits_error}")]
    Open {
        fits_error: Box<fitsio::errors::Error>,
        fits_filename: Box<Path>,
        source_file: &'static str,
        source_line: u32,
    },

    #[error("{source_file}:{source_line}: {fits_filename} HDU '{hdu}': Couldn't find key {key}")]
    MissingKey {
        key: &'static str,
        fits_filename: Box<Path>,
        hdu: Box<str>,
        source_file: &'static str,
        source_line: u32,
    },

    #[error("{source_file}:{source_line}: Couldn't parse {key} in {fits_filename} HDU '{hdu}'")]
    Parse {
        key: &'static str,
        fits_filename: Box<Path>,
        hdu: Box<str>,
        source_file: &'static str,
        source_line: u32,
    },

    #[error("{source_file}:{source_line}: {fits_filename} HDU '{hdu}': Tried to use as an image, but not an image")]
    NotImage {
        fits_filename: Box<Path>,
        hdu: Box<str>,
        source_file: &'static str,
        source_line: u32,
    },

    #[error("{source_file}:{source_line}: {fits_filename} HDU '{hdu}' has shape {actual:?}, expected {expected:?}")]
    Shape {
        fits_filename: Box<Path>,
        hdu: Box<str>,
        expected: Vec<usize>,
        actual: Vec<usize>,
        source_file: &'static str,
        source_line: u32,
    },

    /// A generic error associated with the fitsio crate.
    #[error("{source_file}:{source_line}: {fits_filename} HDU '{hdu}': {fits_error}")]
    Fitsio {
        fits_error: Box<fitsio::errors::Error>,
        fits_filename: Box<Path>,
        hdu: Box<str>,
        source_file: &'static str,
        source_line: u32,
    },
}
