// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper functions for reading and writing FITS files.

mod error;

pub use error::FitsError;

use std::{fmt::Display, panic::Location, path::Path};

use fitsio::{
    hdu::{DescribesHdu, FitsHdu, HduInfo},
    images::{ImageDescription, ImageType},
    FitsFile,
};
use ndarray::prelude::*;

use super::WriteError;

fn hdu_name(hdu: &FitsHdu) -> Box<str> {
    format!("{}", hdu.number).into_boxed_str()
}

/// Open a fits file.
#[track_caller]
pub(crate) fn fits_open(file: &Path) -> Result<FitsFile, FitsError> {
    let caller = Location::caller();
    FitsFile::open(file).map_err(|e| FitsError::Open {
        fits_error: Box::new(e),
        fits_filename: file.to_path_buf().into_boxed_path(),
        source_file: caller.file(),
        source_line: caller.line(),
    })
}

/// Open a fits file's HDU.
#[track_caller]
pub(crate) fn fits_open_hdu<T: DescribesHdu + Display + Copy>(
    fits_fptr: &mut FitsFile,
    hdu_description: T,
) -> Result<FitsHdu, FitsError> {
    let caller = Location::caller();
    fits_fptr.hdu(hdu_description).map_err(|e| FitsError::Fitsio {
        fits_error: Box::new(e),
        fits_filename: fits_fptr.file_path().to_path_buf().into_boxed_path(),
        hdu: format!("{hdu_description}").into_boxed_str(),
        source_file: caller.file(),
        source_line: caller.line(),
    })
}

/// Like [`fits_get_required_key`], but a missing keyword isn't an error.
#[track_caller]
pub(crate) fn fits_get_optional_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &'static str,
) -> Result<Option<T>, FitsError> {
    let caller = Location::caller();
    let unparsed_value: String = match hdu.read_key(fits_fptr, keyword) {
        Ok(value) => value,
        // 202: key not found. 204: key has no value.
        Err(fitsio::errors::Error::Fits(e)) if e.status == 202 || e.status == 204 => {
            return Ok(None)
        }
        Err(e) => {
            return Err(FitsError::Fitsio {
                fits_error: Box::new(e),
                fits_filename: fits_fptr.file_path().to_path_buf().into_boxed_path(),
                hdu: hdu_name(hdu),
                source_file: caller.file(),
                source_line: caller.line(),
            })
        }
    };

    match unparsed_value.trim().parse() {
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(FitsError::Parse {
            key: keyword,
            fits_filename: fits_fptr.file_path().to_path_buf().into_boxed_path(),
            hdu: hdu_name(hdu),
            source_file: caller.file(),
            source_line: caller.line(),
        }),
    }
}

/// Given a FITS file pointer, a HDU that belongs to it, and a keyword, pull out
/// the value of the keyword, parsing it into the desired type.
#[track_caller]
pub(crate) fn fits_get_required_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &'static str,
) -> Result<T, FitsError> {
    let caller = Location::caller();
    let unparsed_value: String = match hdu.read_key(fits_fptr, keyword) {
        Ok(value) => value,
        // 202: key not found.
        Err(fitsio::errors::Error::Fits(e)) if e.status == 202 => {
            return Err(FitsError::MissingKey {
                key: keyword,
                fits_filename: fits_fptr.file_path().to_path_buf().into_boxed_path(),
                hdu: hdu_name(hdu),
                source_file: caller.file(),
                source_line: caller.line(),
            })
        }
        Err(e) => {
            return Err(FitsError::Fitsio {
                fits_error: Box::new(e),
                fits_filename: fits_fptr.file_path().to_path_buf().into_boxed_path(),
                hdu: hdu_name(hdu),
                source_file: caller.file(),
                source_line: caller.line(),
            })
        }
    };

    unparsed_value.trim().parse().map_err(|_| FitsError::Parse {
        key: keyword,
        fits_filename: fits_fptr.file_path().to_path_buf().into_boxed_path(),
        hdu: hdu_name(hdu),
        source_file: caller.file(),
        source_line: caller.line(),
    })
}

/// The shape of a HDU's image. The shape of an empty image is empty.
#[track_caller]
pub(crate) fn fits_get_image_shape(
    fits_fptr: &FitsFile,
    hdu: &FitsHdu,
) -> Result<Vec<usize>, FitsError> {
    let caller = Location::caller();
    match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => Ok(shape.clone()),
        _ => Err(FitsError::NotImage {
            fits_filename: fits_fptr.file_path().to_path_buf().into_boxed_path(),
            hdu: hdu_name(hdu),
            source_file: caller.file(),
            source_line: caller.line(),
        }),
    }
}

/// Read a HDU's image as double-precision floats, checking that it has the
/// expected shape.
#[track_caller]
pub(crate) fn fits_get_array<D: Dimension>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    expected_shape: D,
) -> Result<Array<f64, D>, FitsError> {
    let caller = Location::caller();
    let shape = fits_get_image_shape(fits_fptr, hdu)?;
    if shape.as_slice() != expected_shape.slice() {
        return Err(FitsError::Shape {
            fits_filename: fits_fptr.file_path().to_path_buf().into_boxed_path(),
            hdu: hdu_name(hdu),
            expected: expected_shape.slice().to_vec(),
            actual: shape,
            source_file: caller.file(),
            source_line: caller.line(),
        });
    }

    let data: Vec<f64> = hdu.read_image(fits_fptr).map_err(|e| FitsError::Fitsio {
        fits_error: Box::new(e),
        fits_filename: fits_fptr.file_path().to_path_buf().into_boxed_path(),
        hdu: hdu_name(hdu),
        source_file: caller.file(),
        source_line: caller.line(),
    })?;
    Array::from_shape_vec(expected_shape.clone(), data).map_err(|_| FitsError::Shape {
        fits_filename: fits_fptr.file_path().to_path_buf().into_boxed_path(),
        hdu: hdu_name(hdu),
        expected: expected_shape.slice().to_vec(),
        actual: shape,
        source_file: caller.file(),
        source_line: caller.line(),
    })
}

/// Create a new file, replacing any existing file. If `primary` is given, the
/// primary HDU holds that image.
pub(crate) fn fits_create(
    file: &Path,
    primary: Option<ArrayView2<f64>>,
) -> Result<FitsFile, WriteError> {
    if file.exists() {
        std::fs::remove_file(file)?;
    }
    match primary {
        None => Ok(FitsFile::create(file).open()?),
        Some(image) => {
            let (ny, nx) = image.dim();
            let dim = [ny, nx];
            let image_description = ImageDescription {
                data_type: ImageType::Double,
                dimensions: &dim,
            };
            let mut fptr = FitsFile::create(file)
                .with_custom_primary(&image_description)
                .open()?;
            let hdu = fptr.primary_hdu()?;
            hdu.write_image(&mut fptr, &image.iter().copied().collect::<Vec<f64>>())?;
            Ok(fptr)
        }
    }
}

/// Write an array as a new image HDU.
pub(crate) fn fits_write_array<D: Dimension>(
    fits_fptr: &mut FitsFile,
    name: &str,
    array: ArrayView<f64, D>,
) -> Result<FitsHdu, fitsio::errors::Error> {
    let image_description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: array.shape(),
    };
    let hdu = fits_fptr.create_image(name, &image_description)?;
    // Iteration is in logical (row-major) order.
    hdu.write_image(fits_fptr, &array.iter().copied().collect::<Vec<f64>>())?;
    Ok(hdu)
}

/// Label a file with the software that wrote it.
pub(crate) fn fits_write_software(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
) -> Result<(), fitsio::errors::Error> {
    hdu.write_key(
        fits_fptr,
        "SOFTWARE",
        format!(
            "Created by {} v{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ),
    )
}
