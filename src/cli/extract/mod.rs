// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Extract spectra from a detector image with a PSF.

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::common::{
    display_warnings, InfoPrinter, SpectraArgs, SpectraSelection, Warn, ARG_FILE_HELP,
};
use crate::{
    constants::{
        DEFAULT_BUNDLE_SIZE, DEFAULT_MIN_WEIGHT_FRACTION, DEFAULT_REGULARIZE,
        DEFAULT_WINDOW_SAMPLES,
    },
    extraction::Decorrelation,
    params::ExtractParams,
    tiling::ExtractionJob,
    Ex2dError,
};

const DEFAULT_OUTPUT_SPECTRA_FILENAME: &str = "ex2d_spectra.fits";

lazy_static::lazy_static! {
    static ref BUNDLE_SIZE_HELP: String =
        format!("The number of spectra extracted together in each tile. Default: {DEFAULT_BUNDLE_SIZE}");

    static ref WAVELENGTH_STEP_HELP: String =
        format!("The wavelength range of each tile's core [Angstrom]. Must be a multiple of the wavelength step and divide the wavelength range. Default: {DEFAULT_WINDOW_SAMPLES} wavelength steps");

    static ref REGULARIZE_HELP: String =
        format!("Regularisation added to the diagonal of the normal equations. Default: {DEFAULT_REGULARIZE}");

    static ref MIN_WEIGHT_FRACTION_HELP: String =
        format!("Flux bins with less than this fraction of the maximum pixel weight of a tile are constrained to zero. 0 disables this. Default: {DEFAULT_MIN_WEIGHT_FRACTION}");

    static ref OUTPUT_HELP: String =
        format!("Path to the output spectra file. Default: {DEFAULT_OUTPUT_SPECTRA_FILENAME}");
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct ExtractCliArgs {
    /// Path to the detector image, with inverse variances in an "IVAR" HDU.
    #[clap(short, long, parse(from_str), help_heading = "INPUT FILES")]
    pub(super) image: Option<PathBuf>,

    #[clap(short, long, help = OUTPUT_HELP.as_str(), help_heading = "OUTPUT FILES")]
    pub(super) output: Option<PathBuf>,

    #[clap(short, long, help = BUNDLE_SIZE_HELP.as_str(), help_heading = "TILING")]
    pub(super) bundle_size: Option<usize>,

    #[clap(long, help = WAVELENGTH_STEP_HELP.as_str(), help_heading = "TILING")]
    pub(super) wavelength_step: Option<f64>,

    /// The extra wavelength range extracted on each side of a tile's core and
    /// then discarded [Angstrom]. Default: the size of a PSF spot
    #[clap(long, help_heading = "TILING")]
    pub(super) border: Option<f64>,

    /// The number of off-diagonals of the resolution matrix to keep. Default:
    /// 9 sigma of the PSF along the dispersion direction
    #[clap(long, help_heading = "TILING")]
    pub(super) ndiag: Option<usize>,

    #[clap(long, help = REGULARIZE_HELP.as_str(), help_heading = "SOLVER")]
    pub(super) regularize: Option<f64>,

    #[clap(long, help = MIN_WEIGHT_FRACTION_HELP.as_str(), help_heading = "SOLVER")]
    pub(super) min_weight_fraction: Option<f64>,

    /// Decorrelate each spectrum separately. This removes crosstalk between
    /// spectra from the resolution matrix, at the cost of correlated noise
    /// between spectra.
    #[clap(long, help_heading = "SOLVER")]
    #[serde(default)]
    pub(super) decorrelate_fibers: bool,

    /// Also write a model image, the masked fraction of each flux bin and its
    /// chi-squared to the output file.
    #[clap(long, help_heading = "OUTPUT FILES")]
    #[serde(default)]
    pub(super) full_output: bool,

    /// The fractional error of the PSF model, used for the chi-squared of full
    /// output. Default: the PSF's own
    #[clap(long, help_heading = "OUTPUT FILES")]
    pub(super) psf_error: Option<f64>,

    /// The number of tiles to extract at the same time. Default: the number of
    /// CPU cores
    #[clap(short = 't', long)]
    pub(super) num_threads: Option<usize>,
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct ExtractArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "spectra")]
    #[serde(default)]
    pub(super) spectra_args: SpectraArgs,

    #[clap(flatten)]
    #[serde(rename = "extract")]
    #[serde(default)]
    pub(super) extract_args: ExtractCliArgs,
}

impl ExtractArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified
    /// into a single struct, preferring CLI arguments over those in the file.
    ///
    /// This function should only ever merge arguments, and not try to make
    /// sense of them.
    pub(super) fn merge(self) -> Result<ExtractArgs, Ex2dError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            // Ensure all of the file args are accounted for by pattern
            // matching.
            let ExtractArgs {
                args_file: _,
                spectra_args,
                extract_args,
            } = unpack_arg_file!(arg_file);

            Ok(ExtractArgs {
                args_file: None,
                spectra_args: cli_args.spectra_args.merge(spectra_args),
                extract_args: cli_args.extract_args.merge(extract_args),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<ExtractParams, Ex2dError> {
        debug!("{:#?}", self);

        let ExtractArgs {
            args_file: _,
            spectra_args,
            extract_args:
                ExtractCliArgs {
                    image,
                    output,
                    bundle_size,
                    wavelength_step,
                    border,
                    ndiag,
                    regularize,
                    min_weight_fraction,
                    decorrelate_fibers,
                    full_output,
                    psf_error,
                    num_threads,
                },
        } = self;

        let image_file = match image {
            Some(image) => {
                if !image.exists() {
                    return Err(ExtractArgsError::ImageDoesntExist(image.into_boxed_path()).into());
                }
                image
            }
            None => return Err(ExtractArgsError::NoImage.into()),
        };
        let output = output.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_SPECTRA_FILENAME));
        if output.extension().and_then(|e| e.to_str()) != Some("fits") {
            return Err(ExtractArgsError::OutputNotFits(output.into_boxed_path()).into());
        }
        if num_threads == Some(0) {
            return Err(ExtractArgsError::ZeroThreads.into());
        }

        let SpectraSelection {
            psf,
            spectra,
            wavelengths,
        } = spectra_args.parse()?;

        let mut job = ExtractionJob::new(spectra, wavelengths);
        if let Some(bundle_size) = bundle_size {
            job.bundle_size = bundle_size;
        }
        if let Some(wavelength_step) = wavelength_step {
            job.wavelength_step = wavelength_step;
        }
        if let Some(regularize) = regularize {
            job.regularize = regularize;
        }
        if let Some(min_weight_fraction) = min_weight_fraction {
            job.min_weight_fraction = min_weight_fraction;
        }
        job.border = border;
        job.ndiag = ndiag;
        job.num_threads = num_threads;
        if decorrelate_fibers {
            job.decorrelation = Decorrelation::PerSpectrum;
        }
        job.full_output = full_output;
        job.psf_error = psf_error;
        if psf_error.is_some() && !full_output {
            "--psf-error is only used with --full-output".warn();
        }

        // Plan the tiles now; any problems with the tiling are reported before
        // any work is done.
        let plan = job.plan(psf.as_ref())?;

        if let Some(border) = border {
            let extent = psf.spot_wavelength_extent(job.spectra.start, job.wavelengths.wavemin);
            if border < extent {
                format!("The tile border ({border} Å) is smaller than a PSF spot ({extent:.2} Å); tile edges may be biased").warn();
            }
        }
        if job.regularize == 0.0 {
            "No regularisation is used; tiles with flux bins that the pixels don't constrain will fail".warn();
        }

        let mut input_printer = InfoPrinter::new("Extracting spectra".into());
        input_printer.push_block(vec![
            format!("from {}", image_file.display()).into(),
            format!("with a {} PSF", psf.get_psf_type()).into(),
        ]);
        input_printer.push_line(format!("Spectra: {:?}", job.spectra).into());
        input_printer.push_line(format!("Wavelengths: {}", job.wavelengths).into());
        input_printer.display();

        let mut tile_printer = InfoPrinter::new("Tiling".into());
        tile_printer.push_block(vec![
            format!(
                "{} tiles of {} spectra x {} wavelengths",
                plan.tiles.len(),
                job.bundle_size,
                plan.window_samples
            )
            .into(),
            format!("Border: {} wavelengths", plan.border_samples).into(),
            format!("Resolution band: {} diagonals", 2 * plan.ndiag + 1).into(),
        ]);
        tile_printer.push_block(vec![
            format!("Regularisation: {}", job.regularize).into(),
            format!("Minimum weight fraction: {}", job.min_weight_fraction).into(),
            format!("Decorrelation: {}", job.decorrelation).into(),
        ]);
        if job.full_output {
            tile_printer.push_line(
                format!(
                    "Full output, with a PSF error of {}",
                    job.psf_error.unwrap_or_else(|| psf.psf_error())
                )
                .into(),
            );
        }
        tile_printer.display();

        display_warnings();

        Ok(ExtractParams {
            image_file,
            psf,
            job,
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

impl ExtractCliArgs {
    fn merge(self, other: Self) -> Self {
        Self {
            image: self.image.or(other.image),
            output: self.output.or(other.output),
            bundle_size: self.bundle_size.or(other.bundle_size),
            wavelength_step: self.wavelength_step.or(other.wavelength_step),
            border: self.border.or(other.border),
            ndiag: self.ndiag.or(other.ndiag),
            regularize: self.regularize.or(other.regularize),
            min_weight_fraction: self.min_weight_fraction.or(other.min_weight_fraction),
            decorrelate_fibers: self.decorrelate_fibers || other.decorrelate_fibers,
            full_output: self.full_output || other.full_output,
            psf_error: self.psf_error.or(other.psf_error),
            num_threads: self.num_threads.or(other.num_threads),
        }
    }
}

#[derive(Error, Debug)]
pub(super) enum ExtractArgsError {
    #[error("No detector image was supplied")]
    NoImage,

    #[error("Detector image '{0}' doesn't exist")]
    ImageDoesntExist(Box<Path>),

    #[error("Output file '{0}' must have a .fits extension")]
    OutputNotFits(Box<Path>),

    #[error("The number of threads cannot be 0!")]
    ZeroThreads,
}
