// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Simulate a detector image of flat spectra through a PSF.


use std::path::{Path, PathBuf};

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::common::{display_warnings, InfoPrinter, SpectraArgs, SpectraSelection, ARG_FILE_HELP};
use crate::{constants::DEFAULT_SEED, params::SimulateParams, Ex2dError};

const DEFAULT_OUTPUT_IMAGE_FILENAME: &str = "ex2d_image.fits";
const DEFAULT_FLUX: f64 = 100.0;

lazy_static::lazy_static! {
    static ref FLUX_HELP: String =
        format!("The flux of every spectrum in every wavelength sample [counts]. Default: {DEFAULT_FLUX}");

    static ref SEED_HELP: String =
        format!("The seed of the noise generator. Default: {DEFAULT_SEED}");

    static ref OUTPUT_HELP: String =
        format!("Path to the output image file. Default: {DEFAULT_OUTPUT_IMAGE_FILENAME}");
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct SimulateCliArgs {
    #[clap(short, long, help = OUTPUT_HELP.as_str(), help_heading = "OUTPUT FILES")]
    pub(super) output: Option<PathBuf>,

    #[clap(short, long, help = FLUX_HELP.as_str(), help_heading = "SIMULATION")]
    pub(super) flux: Option<f64>,

    /// The standard deviation of Gaussian noise added to every pixel [counts].
    /// Default: 0
    #[clap(short, long, help_heading = "NOISE")]
    pub(super) read_noise: Option<f64>,

    /// Add Poisson noise to every pixel.
    #[clap(long, help_heading = "NOISE")]
    #[serde(default)]
    pub(super) photon_noise: bool,

    #[clap(long, help = SEED_HELP.as_str(), help_heading = "NOISE")]
    pub(super) seed: Option<u64>,
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct SimulateArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "spectra")]
    #[serde(default)]
    pub(super) spectra_args: SpectraArgs,

    #[clap(flatten)]
    #[serde(rename = "simulate")]
    #[serde(default)]
    pub(super) simulate_args: SimulateCliArgs,
}

impl SimulateArgs {
    /// Consolidate the command-line arguments with those in the argument file
    /// (if any), preferring the command-line arguments.
    pub(super) fn merge(self) -> Result<SimulateArgs, Ex2dError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let SimulateArgs {
                args_file: _,
                spectra_args,
                simulate_args,
            } = unpack_arg_file!(arg_file);

            Ok(SimulateArgs {
                args_file: None,
                spectra_args: cli_args.spectra_args.merge(spectra_args),
                simulate_args: cli_args.simulate_args.merge(simulate_args),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<SimulateParams, Ex2dError> {
        debug!("{:#?}", self);

        let SimulateArgs {
            args_file: _,
            spectra_args,
            simulate_args:
                SimulateCliArgs {
                    output,
                    flux,
                    read_noise,
                    photon_noise,
                    seed,
                },
        } = self;

        let output = output.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_IMAGE_FILENAME));
        if output.extension().and_then(|e| e.to_str()) != Some("fits") {
            return Err(SimulateArgsError::OutputNotFits(output.into_boxed_path()).into());
        }
        let flux = flux.unwrap_or(DEFAULT_FLUX);
        if !flux.is_finite() {
            return Err(SimulateArgsError::BadFlux(flux).into());
        }
        let read_noise = read_noise.unwrap_or(0.0);
        if !(read_noise >= 0.0) || !read_noise.is_finite() {
            return Err(SimulateArgsError::BadReadNoise(read_noise).into());
        }
        let seed = seed.unwrap_or(DEFAULT_SEED);

        let SpectraSelection {
            psf,
            spectra,
            wavelengths,
        } = spectra_args.parse()?;

        let mut printer = InfoPrinter::new("Simulating a detector image".into());
        let (ny, nx) = psf.detector_shape();
        printer.push_line(format!("with a {} PSF ({nx} x {ny} pixels)", psf.get_psf_type()).into());
        printer.push_block(vec![
            format!("Spectra: {spectra:?}").into(),
            format!("Wavelengths: {wavelengths}").into(),
            format!("Flux per sample: {flux}").into(),
        ]);
        printer.push_block(vec![
            format!("Read noise: {read_noise}").into(),
            format!(
                "Photon noise: {}",
                if photon_noise { "yes" } else { "no" }
            )
            .into(),
            format!("Seed: {seed}").into(),
        ]);
        printer.display();

        display_warnings();

        Ok(SimulateParams {
            psf,
            spectra,
            wavelengths,
            flux,
            read_noise,
            photon_noise,
            seed,
            output,
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), Ex2dError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let params = self.parse()?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        params.run()?;
        Ok(())
    }
}

impl SimulateCliArgs {
    fn merge(self, other: Self) -> Self {
        Self {
            output: self.output.or(other.output),
            flux: self.flux.or(other.flux),
            read_noise: self.read_noise.or(other.read_noise),
            photon_noise: self.photon_noise || other.photon_noise,
            seed: self.seed.or(other.seed),
        }
    }
}

#[derive(Error, Debug)]
pub(super) enum SimulateArgsError {
    #[error("Output file '{0}' must have a .fits extension")]
    OutputNotFits(Box<Path>),

    #[error("The flux must be finite, got {0}")]
    BadFlux(f64),

    #[error("The read noise must be non-negative and finite, got {0}")]
    BadReadNoise(f64),
}
