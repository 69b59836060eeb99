// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reading and writing detector images and extracted spectra as FITS files.

mod error;
mod fits;
mod image;
mod spectra;

pub use error::{ReadError, WriteError};
pub use fits::FitsError;
pub use image::{read_image, write_image, DetectorImage};
pub use spectra::{read_spectra, write_spectra};
