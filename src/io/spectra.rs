// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Extracted spectra files.
//!
//! The primary HDU has no data; its header describes the spectra:
//!
//! - `SPECMIN`: the index of the first spectrum
//! - `NSPEC`: the number of spectra
//! - `WAVEMIN`, `WAVEMAX`: the first and last wavelengths \[Å\]
//! - `WAVESTEP`: the wavelength step \[Å\]
//! - `NWAVE`: the number of wavelengths
//! - `NDIAG`: the half-width of the resolution band
//!
//! The "FLUX" and "IVAR" HDUs are `NSPEC x NWAVE` images, and the "RESOLUTION"
//! HDU is `NSPEC x (2 * NDIAG + 1) x NWAVE`.
//!
//! Files with diagnostics have `FULLOUT = 1` and the detector shape (`NPIX_Y`,
//! `NPIX_X`) in the primary header. The "MODEL" HDU is the `NPIX_Y x NPIX_X`
//! model image, and "PIXMASK_FRACTION" and "CHI2PIX" are `NSPEC x NWAVE`.

use std::path::Path;

use log::debug;
use ndarray::prelude::*;

use super::{fits::*, ReadError, WriteError};
use crate::{
    grid::WavelengthGrid,
    spectra::{Diagnostics, ExtractedSpectra},
};

pub fn read_spectra(file: &Path) -> Result<ExtractedSpectra, ReadError> {
    debug!("Reading extracted spectra {}", file.display());
    let mut fptr = fits_open(file)?;
    let hdu = fits_open_hdu(&mut fptr, 0)?;
    let specmin: usize = fits_get_required_key(&mut fptr, &hdu, "SPECMIN")?;
    let num_spectra: usize = fits_get_required_key(&mut fptr, &hdu, "NSPEC")?;
    let wavemin: f64 = fits_get_required_key(&mut fptr, &hdu, "WAVEMIN")?;
    let step: f64 = fits_get_required_key(&mut fptr, &hdu, "WAVESTEP")?;
    let num_wavelengths: usize = fits_get_required_key(&mut fptr, &hdu, "NWAVE")?;
    let ndiag: usize = fits_get_required_key(&mut fptr, &hdu, "NDIAG")?;
    let full_output = fits_get_optional_key::<i64>(&mut fptr, &hdu, "FULLOUT")? == Some(1);
    let detector_shape: Option<(usize, usize)> = if full_output {
        Some((
            fits_get_required_key(&mut fptr, &hdu, "NPIX_Y")?,
            fits_get_required_key(&mut fptr, &hdu, "NPIX_X")?,
        ))
    } else {
        None
    };
    let wavelengths =
        WavelengthGrid::new(wavemin, step, num_wavelengths).map_err(|err| ReadError::Grid {
            file: file.display().to_string(),
            err,
        })?;

    let hdu = fits_open_hdu(&mut fptr, "FLUX")?;
    let flux = fits_get_array(&mut fptr, &hdu, Ix2(num_spectra, num_wavelengths))?;
    let hdu = fits_open_hdu(&mut fptr, "IVAR")?;
    let ivar = fits_get_array(&mut fptr, &hdu, Ix2(num_spectra, num_wavelengths))?;
    let hdu = fits_open_hdu(&mut fptr, "RESOLUTION")?;
    let resolution = fits_get_array(
        &mut fptr,
        &hdu,
        Ix3(num_spectra, 2 * ndiag + 1, num_wavelengths),
    )?;

    let diagnostics = match detector_shape {
        Some((ny, nx)) => {
            let hdu = fits_open_hdu(&mut fptr, "MODEL")?;
            let model = fits_get_array(&mut fptr, &hdu, Ix2(ny, nx))?;
            let hdu = fits_open_hdu(&mut fptr, "PIXMASK_FRACTION")?;
            let pixmask_fraction =
                fits_get_array(&mut fptr, &hdu, Ix2(num_spectra, num_wavelengths))?;
            let hdu = fits_open_hdu(&mut fptr, "CHI2PIX")?;
            let chi2pix = fits_get_array(&mut fptr, &hdu, Ix2(num_spectra, num_wavelengths))?;
            Some(Diagnostics {
                model,
                pixmask_fraction,
                chi2pix,
            })
        }
        None => None,
    };

    Ok(ExtractedSpectra {
        specmin,
        wavelengths,
        flux,
        ivar,
        resolution,
        diagnostics,
    })
}

pub fn write_spectra(file: &Path, spectra: &ExtractedSpectra) -> Result<(), WriteError> {
    debug!("Writing extracted spectra {}", file.display());
    let mut fptr = fits_create(file, None)?;
    let hdu = fptr.primary_hdu()?;
    let grid = &spectra.wavelengths;
    hdu.write_key(&mut fptr, "SPECMIN", spectra.specmin as i64)?;
    hdu.write_key(&mut fptr, "NSPEC", spectra.num_spectra() as i64)?;
    hdu.write_key(&mut fptr, "WAVEMIN", grid.wavemin)?;
    hdu.write_key(&mut fptr, "WAVEMAX", grid.last())?;
    hdu.write_key(&mut fptr, "WAVESTEP", grid.step)?;
    hdu.write_key(&mut fptr, "NWAVE", grid.len as i64)?;
    hdu.write_key(&mut fptr, "NDIAG", spectra.ndiag() as i64)?;
    if let Some(diagnostics) = &spectra.diagnostics {
        let (ny, nx) = diagnostics.model.dim();
        hdu.write_key(&mut fptr, "FULLOUT", 1_i64)?;
        hdu.write_key(&mut fptr, "NPIX_Y", ny as i64)?;
        hdu.write_key(&mut fptr, "NPIX_X", nx as i64)?;
    }
    fits_write_software(&mut fptr, &hdu)?;

    fits_write_array(&mut fptr, "FLUX", spectra.flux.view())?;
    fits_write_array(&mut fptr, "IVAR", spectra.ivar.view())?;
    fits_write_array(&mut fptr, "RESOLUTION", spectra.resolution.view())?;
    if let Some(diagnostics) = &spectra.diagnostics {
        fits_write_array(&mut fptr, "MODEL", diagnostics.model.view())?;
        fits_write_array(&mut fptr, "PIXMASK_FRACTION", diagnostics.pixmask_fraction.view())?;
        fits_write_array(&mut fptr, "CHI2PIX", diagnostics.chi2pix.view())?;
    }
    Ok(())
}
