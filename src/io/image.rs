// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Detector images.
//!
//! The image is in the primary HDU (or, if the primary HDU is empty, a HDU
//! called "IMAGE") and the pixel inverse variances are in a HDU called "IVAR".

use std::path::Path;

use log::debug;
use ndarray::prelude::*;

use super::{fits::*, ReadError, WriteError};

/// A detector image and the inverse variance of each of its pixels. The first
/// dimension is rows (y).
#[derive(Debug, Clone)]
pub struct DetectorImage {
    pub image: Array2<f64>,
    pub ivar: Array2<f64>,
}

fn image_dim(shape: &[usize]) -> Option<(usize, usize)> {
    match shape {
        [ny, nx] if *ny > 0 && *nx > 0 => Some((*ny, *nx)),
        _ => None,
    }
}

pub fn read_image(file: &Path) -> Result<DetectorImage, ReadError> {
    debug!("Reading detector image {}", file.display());
    let mut fptr = fits_open(file)?;

    let hdu = fits_open_hdu(&mut fptr, 0)?;
    let hdu = if fits_get_image_shape(&fptr, &hdu)?.is_empty() {
        fits_open_hdu(&mut fptr, "IMAGE")?
    } else {
        hdu
    };
    let (ny, nx) = image_dim(&fits_get_image_shape(&fptr, &hdu)?).ok_or_else(|| {
        ReadError::NoImage {
            file: file.display().to_string(),
        }
    })?;
    let image = fits_get_array(&mut fptr, &hdu, Ix2(ny, nx))?;

    let hdu = fits_open_hdu(&mut fptr, "IVAR")?;
    let ivar_shape = fits_get_image_shape(&fptr, &hdu)?;
    if ivar_shape.as_slice() != [ny, nx] {
        return Err(ReadError::ImageShapes {
            file: file.display().to_string(),
            image: (ny, nx),
            ivar: image_dim(&ivar_shape).unwrap_or((0, 0)),
        });
    }
    let ivar = fits_get_array(&mut fptr, &hdu, Ix2(ny, nx))?;

    Ok(DetectorImage { image, ivar })
}

pub fn write_image(file: &Path, image: &DetectorImage) -> Result<(), WriteError> {
    debug!("Writing detector image {}", file.display());
    let mut fptr = fits_create(file, Some(image.image.view()))?;
    let hdu = fptr.primary_hdu()?;
    fits_write_software(&mut fptr, &hdu)?;
    fits_write_array(&mut fptr, "IVAR", image.ivar.view())?;
    Ok(())
}
