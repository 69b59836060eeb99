// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod pipeline;

use std::{
    path::{Path, PathBuf},
    process::Output,
    str::from_utf8,
};

use assert_cmd::{output::OutputError, Command};
use indoc::indoc;

fn ex2d() -> Command {
    Command::cargo_bin("ex2d").unwrap()
}

fn get_cmd_output(result: Result<Output, OutputError>) -> (String, String) {
    let output = match result {
        Ok(o) => o,
        Err(o) => o.as_output().unwrap().clone(),
    };
    (
        from_utf8(&output.stdout).unwrap().to_string(),
        from_utf8(&output.stderr).unwrap().to_string(),
    )
}

/// Write a PSF of twenty well-separated spectra into `dir`. Traces have 1 Å
/// per pixel dispersion and cover 7950 to 8250 Å.
fn write_psf(dir: &Path) -> PathBuf {
    let psf = dir.join("psf.toml");
    std::fs::write(
        &psf,
        indoc! {r#"
            type = "gaussian"
            num_spectra = 20
            npix_x = 215
            npix_y = 320
            wavemin = 7950.0
            wavemax = 8250.0
            x0 = 10.0
            y0 = 10.0
            fiber_spacing = 10.0
            angstroms_per_pixel = 1.0
            sigma_x = 1.0
            sigma_y = 1.0
        "#},
    )
    .expect("couldn't write the PSF file");
    psf
}
