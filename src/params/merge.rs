// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Merge files of extracted spectra (e.g. one per bundle) into one file.

use std::path::PathBuf;

use log::info;
use thiserror::Error;
use vec1::Vec1;

use crate::{
    io::{read_spectra, write_spectra, ReadError, WriteError},
    spectra::{merge, MergeError},
};

/// Parameters needed to merge extracted spectra.
pub(crate) struct MergeParams {
    pub(crate) inputs: Vec1<PathBuf>,

    pub(crate) output: PathBuf,

    /// If specified, the merged file must have exactly spectra
    /// `0..num_spectra`.
    pub(crate) num_spectra: Option<usize>,
}

impl MergeParams {
    pub(crate) fn run(&self) -> Result<(), MergeFilesError> {
        let parts = self
            .inputs
            .iter()
            .map(|file| read_spectra(file))
            .collect::<Result<Vec<_>, _>>()?;
        let merged = merge(parts, self.num_spectra)?;
        write_spectra(&self.output, &merged)?;
        info!(
            "Merged {} files into spectra {:?} in {}",
            self.inputs.len(),
            merged.spectra(),
            self.output.display()
        );

        Ok(())
    }
}

#[derive(Error, Debug)]
pub(crate) enum MergeFilesError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Write(#[from] WriteError),
}
