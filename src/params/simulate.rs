// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Simulate a detector image of flat spectra.

use std::{ops::Range, path::PathBuf};

use log::{debug, info};
use ndarray::Array2;
use thiserror::Error;

use crate::{
    grid::WavelengthGrid,
    io::{write_image, WriteError},
    psf::Psf,
    simulate::{add_noise, project, NoiseError},
};

/// Parameters needed to simulate a detector image.
pub(crate) struct SimulateParams {
    pub(crate) psf: Box<dyn Psf>,

    /// The spectra to put on the detector.
    pub(crate) spectra: Range<usize>,

    pub(crate) wavelengths: WavelengthGrid,

    /// The flux of every spectrum at every wavelength sample.
    pub(crate) flux: f64,

    /// The standard deviation of Gaussian read noise. 0 means no read noise.
    pub(crate) read_noise: f64,

    pub(crate) photon_noise: bool,

    pub(crate) seed: u64,

    pub(crate) output: PathBuf,
}

impl SimulateParams {
    pub(crate) fn run(&self) -> Result<(), SimulateError> {
        let SimulateParams {
            psf,
            spectra,
            wavelengths,
            flux,
            read_noise,
            photon_noise,
            seed,
            output,
        } = self;

        let fluxes = Array2::from_elem((spectra.len(), wavelengths.len), *flux);
        let model = project(
            psf.as_ref(),
            spectra.clone(),
            &wavelengths.values(),
            fluxes.view(),
        );
        debug!("Total model counts: {}", model.sum());
        let image = add_noise(model.view(), *read_noise, *photon_noise, *seed)?;
        write_image(output, &image)?;
        info!("Wrote the simulated image to {}", output.display());

        Ok(())
    }
}

#[derive(Error, Debug)]
pub(crate) enum SimulateError {
    #[error(transparent)]
    Noise(#[from] NoiseError),

    #[error(transparent)]
    Write(#[from] WriteError),
}
