// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Merge extracted spectra files, e.g. bundles extracted separately.

use std::path::{Path, PathBuf};

use clap::Parser;
use log::{debug, info};
use thiserror::Error;
use vec1::Vec1;

use super::common::InfoPrinter;
use crate::{params::MergeParams, Ex2dError};

#[derive(Parser, Debug, Clone, Default)]
pub(super) struct MergeArgs {
    /// Paths to the extracted spectra files. Together they must cover a
    /// contiguous range of spectra without overlapping.
    #[clap(name = "INPUT_FILES", parse(from_os_str), required = true)]
    pub(super) inputs: Vec<PathBuf>,

    /// Path to the merged spectra file.
    #[clap(short, long, help_heading = "OUTPUT FILES")]
    pub(super) output: PathBuf,

    /// The number of spectra on the detector. If given, the merged file must
    /// have every spectrum, starting from spectrum 0.
    #[clap(short, long)]
    pub(super) num_spectra: Option<usize>,
}

impl MergeArgs {
    fn parse(self) -> Result<MergeParams, MergeArgsError> {
        let MergeArgs {
            inputs,
            output,
            num_spectra,
        } = self;

        let inputs = Vec1::try_from_vec(inputs).map_err(|_| MergeArgsError::NoInputs)?;
        for input in &inputs {
            if !input.exists() {
                return Err(MergeArgsError::InputDoesntExist(
                    input.clone().into_boxed_path(),
                ));
            }
        }
        if inputs.contains(&output) {
            return Err(MergeArgsError::OutputIsInput(output.into_boxed_path()));
        }

        let mut printer = InfoPrinter::new("Merging extracted spectra".into());
        printer.push_block(inputs.iter().map(|i| i.display().to_string().into()).collect());
        printer.push_line(format!("into {}", output.display()).into());
        printer.display();

        Ok(MergeParams {
            inputs,
            output,
            num_spectra,
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), Ex2dError> {
        debug!("Converting arguments into parameters");
        let params = self.parse()?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        params.run()?;
        Ok(())
    }
}

#[derive(Error, Debug)]
pub(super) enum MergeArgsError {
    #[error("No input files were supplied")]
    NoInputs,

    #[error("Input file '{0}' doesn't exist")]
    InputDoesntExist(Box<Path>),

    #[error("The output file '{0}' is also an input file")]
    OutputIsInput(Box<Path>),
}
