// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Extract spectra from a detector image.

use std::path::PathBuf;

use log::info;
use thiserror::Error;

use crate::{
    io::{read_image, write_spectra, ReadError, WriteError},
    psf::Psf,
    tiling::{ExtractionJob, TilingError},
};

/// Parameters needed to extract spectra.
pub(crate) struct ExtractParams {
    /// The detector image (and its inverse variances).
    pub(crate) image_file: PathBuf,

    pub(crate) psf: Box<dyn Psf>,

    /// What to extract and how to tile it.
    pub(crate) job: ExtractionJob,

    /// Where the extracted spectra are written.
    pub(crate) output: PathBuf,
}

impl ExtractParams {
    pub(crate) fn run(&self) -> Result<(), ExtractError> {
        let ExtractParams {
            image_file,
            psf,
            job,
            output,
        } = self;

        let image = read_image(image_file)?;
        let spectra = job.run(psf.as_ref(), &image)?;
        // Nothing is written unless every tile succeeded.
        write_spectra(output, &spectra)?;
        info!(
            "Wrote {} spectra x {} wavelengths to {}",
            spectra.num_spectra(),
            spectra.wavelengths.len,
            output.display()
        );

        Ok(())
    }
}

#[derive(Error, Debug)]
pub(crate) enum ExtractError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Tiling(#[from] TilingError),

    #[error(transparent)]
    Write(#[from] WriteError),
}
