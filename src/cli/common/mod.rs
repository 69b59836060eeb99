// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Common arguments for command-line interfaces. Both `extract` and `simulate`
//! need a PSF and a selection of spectra and wavelengths, so those arguments
//! are shared between them.

mod printers;
#[cfg(test)]
mod tests;

#[cfg(test)]
pub(super) use printers::take_warnings;
pub(super) use printers::InfoPrinter;
pub(crate) use printers::{display_warnings, Warn};

use std::{ops::Range, path::PathBuf};

use clap::Parser;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::{
    grid::{GridError, WavelengthGrid},
    psf::{read_psf, Psf, PsfError},
};

lazy_static::lazy_static! {
    pub(super) static ref ARG_FILE_TYPES_COMMA_SEPARATED: String = ArgFileTypes::iter().join(", ");

    pub(super) static ref ARG_FILE_HELP: String =
        format!("All arguments may be specified in a file. Any CLI arguments override arguments set in the file. Supported formats: {}", *ARG_FILE_TYPES_COMMA_SEPARATED);
}

#[derive(Debug, Display, EnumIter, EnumString)]
pub(super) enum ArgFileTypes {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

macro_rules! unpack_arg_file {
    ($arg_file:expr) => ({
        use std::{fs::File, io::Read, str::FromStr};

        use crate::cli::common::{ArgFileTypes, ARG_FILE_TYPES_COMMA_SEPARATED};

        debug!("Attempting to parse argument file {}", $arg_file.display());

        let mut contents = String::new();
        let arg_file_type = $arg_file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ArgFileTypes::from_str(&e).ok());

        match arg_file_type {
            Some(ArgFileTypes::Toml) => {
                debug!("Parsing toml file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match toml::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(Ex2dError::ArgFile(format!(
                            "Couldn't decode toml structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }
            Some(ArgFileTypes::Json) => {
                debug!("Parsing json file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match serde_json::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(Ex2dError::ArgFile(format!(
                            "Couldn't decode json structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }

            _ => {
                return Err(Ex2dError::ArgFile(format!(
                    "Argument file '{:?}' doesn't have a recognised file extension! Valid extensions are: {}", $arg_file, *ARG_FILE_TYPES_COMMA_SEPARATED)
                ))
            }
        }
    });
}

/// Which spectra, and at which wavelengths.
#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct SpectraArgs {
    /// Path to the PSF file. Supported formats: toml, json.
    #[clap(short, long, parse(from_str), help_heading = "INPUT FILES")]
    pub(super) psf: Option<PathBuf>,

    /// The index of the first spectrum. Default: 0
    #[clap(short, long, help_heading = "SPECTRA")]
    pub(super) specmin: Option<usize>,

    /// The number of spectra. Default: every spectrum of the PSF from specmin
    #[clap(short, long, help_heading = "SPECTRA")]
    pub(super) nspec: Option<usize>,

    /// The wavelengths, as "WMIN,WMAX,DW" [Angstrom]. Samples are WMIN,
    /// WMIN+DW, ... up to, but not including, WMAX.
    #[clap(short, long, value_name = "WMIN,WMAX,DW", help_heading = "SPECTRA")]
    pub(super) wavelength: Option<String>,
}

/// [`SpectraArgs`] that have been made sense of.
pub(super) struct SpectraSelection {
    pub(super) psf: Box<dyn Psf>,
    pub(super) spectra: Range<usize>,
    pub(super) wavelengths: WavelengthGrid,
}

impl SpectraArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        Self {
            psf: self.psf.or(other.psf),
            specmin: self.specmin.or(other.specmin),
            nspec: self.nspec.or(other.nspec),
            wavelength: self.wavelength.or(other.wavelength),
        }
    }

    pub(super) fn parse(self) -> Result<SpectraSelection, SpectraArgsError> {
        let SpectraArgs {
            psf,
            specmin,
            nspec,
            wavelength,
        } = self;

        let psf_file = psf.ok_or(SpectraArgsError::NoPsf)?;
        if !psf_file.exists() {
            return Err(SpectraArgsError::PsfDoesntExist(psf_file.into_boxed_path()));
        }
        let psf = read_psf(&psf_file)?;

        let num_psf_spectra = psf.num_spectra();
        let specmin = specmin.unwrap_or(0);
        if specmin >= num_psf_spectra {
            return Err(SpectraArgsError::SpecminTooBig {
                specmin,
                num_spectra: num_psf_spectra,
            });
        }
        let nspec = nspec.unwrap_or(num_psf_spectra - specmin);
        if nspec == 0 {
            return Err(SpectraArgsError::NoSpectra);
        }
        if specmin + nspec > num_psf_spectra {
            return Err(SpectraArgsError::TooManySpectra {
                specmin,
                nspec,
                num_spectra: num_psf_spectra,
            });
        }

        let wavelength = wavelength.ok_or(SpectraArgsError::NoWavelengths)?;
        let wavelengths = parse_wavelengths(&wavelength)?;
        let (psf_wavemin, psf_wavemax) = psf.wavelength_range();
        if wavelengths.wavemin < psf_wavemin || wavelengths.last() > psf_wavemax {
            format!(
                "The wavelengths {}..{} extend beyond the PSF's {psf_wavemin}..{psf_wavemax}",
                wavelengths.wavemin,
                wavelengths.last()
            )
            .warn();
        }
        debug!("Wavelengths: {wavelengths}");

        Ok(SpectraSelection {
            psf,
            spectra: specmin..specmin + nspec,
            wavelengths,
        })
    }
}

/// Parse a "WMIN,WMAX,DW" string.
pub(super) fn parse_wavelengths(s: &str) -> Result<WavelengthGrid, SpectraArgsError> {
    let bad = || SpectraArgsError::BadWavelengths(s.to_string());
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| bad())?;
    match values.as_slice() {
        [wavemin, wavemax, step] => Ok(WavelengthGrid::from_range(*wavemin, *wavemax, *step)?),
        _ => Err(bad()),
    }
}

#[derive(Error, Debug)]
pub(super) enum SpectraArgsError {
    #[error("No PSF file was supplied")]
    NoPsf,

    #[error("PSF file '{0}' doesn't exist")]
    PsfDoesntExist(Box<std::path::Path>),

    #[error("specmin ({specmin}) must be less than the number of PSF spectra ({num_spectra})")]
    SpecminTooBig { specmin: usize, num_spectra: usize },

    #[error("Number of spectra cannot be 0!")]
    NoSpectra,

    #[error("Spectra {specmin}..{} were requested, but the PSF only has {num_spectra} spectra", specmin + nspec)]
    TooManySpectra {
        specmin: usize,
        nspec: usize,
        num_spectra: usize,
    },

    #[error("No wavelengths were supplied; use --wavelength WMIN,WMAX,DW")]
    NoWavelengths,

    #[error("Couldn't parse '{0}' as wavelengths; expected WMIN,WMAX,DW")]
    BadWavelengths(String),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Psf(#[from] PsfError),
}
