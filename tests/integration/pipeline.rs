// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Simulate an image, extract it in two halves and merge the results.

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use tempfile::TempDir;

use crate::{ex2d, get_cmd_output, write_psf};
use ::ex2d::io::{read_image, read_spectra};

#[test]
fn test_simulate_extract_merge() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let psf = write_psf(tmp_dir.path());
    let psf = psf.display().to_string();
    let image = tmp_dir.path().join("image.fits");
    let image = image.display().to_string();

    // The simulated spectra extend well past the extracted wavelengths, so
    // the resolution matrix only ever sees flat spectra.
    #[rustfmt::skip]
    let cmd = ex2d()
        .args([
            "simulate",
            "--psf", &psf,
            "--wavelength", "7960,8240,1",
            "--flux", "100",
            "--output", &image,
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "simulate failed: {}", cmd.err().unwrap());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
    let detector = read_image(image.as_ref()).unwrap();
    assert_abs_diff_eq!(detector.image.sum(), 20.0 * 280.0 * 100.0, epsilon = 1e-6);

    let mut halves = vec![];
    for specmin in ["0", "10"] {
        let output = tmp_dir.path().join(format!("spectra_{specmin}.fits"));
        #[rustfmt::skip]
        let cmd = ex2d()
            .args([
                "extract",
                "--psf", &psf,
                "--image", &image,
                "--specmin", specmin,
                "--nspec", "10",
                "--wavelength", "8000,8200,1",
                "--bundle-size", "5",
                "--wavelength-step", "50",
                "--full-output",
                "--output", &output.display().to_string(),
                "--no-progress-bars",
            ])
            .ok();
        assert!(cmd.is_ok(), "extract failed: {}", cmd.err().unwrap());
        let (stdout, stderr) = get_cmd_output(cmd);
        assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
        assert!(stdout.contains("ex2d extract complete."), "{stdout}");
        halves.push(output);
    }

    let merged = tmp_dir.path().join("merged.fits");
    #[rustfmt::skip]
    let cmd = ex2d()
        .args([
            "merge",
            &halves[1].display().to_string(),
            &halves[0].display().to_string(),
            "--output", &merged.display().to_string(),
            "--num-spectra", "20",
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "merge failed: {}", cmd.err().unwrap());

    let spectra = read_spectra(&merged).unwrap();
    assert_eq!(spectra.spectra(), 0..20);
    assert_eq!(spectra.wavelengths.len, 200);
    assert_abs_diff_eq!(spectra.flux, Array2::from_elem((20, 200), 100.0), epsilon = 1e-2);
    assert!(spectra.ivar.iter().all(|&v| v > 0.0));

    // Each half models its own spectra, and the merged model has both.
    let diagnostics = spectra.diagnostics.unwrap();
    assert_eq!(diagnostics.model.dim(), detector.image.dim());
    assert_eq!(diagnostics.chi2pix.dim(), (20, 200));
    // The trace of spectra 3 and 13 at 8100 Å.
    for x in [40, 140] {
        assert_abs_diff_eq!(
            diagnostics.model[(160, x)],
            detector.image[(160, x)],
            epsilon = 1e-2
        );
    }
}

#[test]
fn test_dry_run_writes_nothing() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let psf = write_psf(tmp_dir.path());
    let output = tmp_dir.path().join("image.fits");

    #[rustfmt::skip]
    let cmd = ex2d()
        .args([
            "simulate",
            "--psf", &psf.display().to_string(),
            "--wavelength", "8000,8100,1",
            "--output", &output.display().to_string(),
            "--dry-run",
        ])
        .ok();
    assert!(cmd.is_ok(), "simulate failed: {}", cmd.err().unwrap());
    assert!(!output.exists());
}

#[test]
fn test_missing_psf_fails() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let psf = tmp_dir.path().join("missing.toml");

    #[rustfmt::skip]
    let cmd = ex2d()
        .args([
            "simulate",
            "--psf", &psf.display().to_string(),
            "--wavelength", "8000,8100,1",
        ])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("doesn't exist"), "{stderr}");
}

#[test]
fn test_save_toml_reproduces_a_run() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let psf = write_psf(tmp_dir.path());
    let output = tmp_dir.path().join("image.fits");
    let args_file = tmp_dir.path().join("simulate.toml");

    #[rustfmt::skip]
    let cmd = ex2d()
        .args([
            "simulate",
            "--psf", &psf.display().to_string(),
            "--wavelength", "8000,8100,1",
            "--read-noise", "3",
            "--output", &output.display().to_string(),
            "--save-toml", &args_file.display().to_string(),
            "--dry-run",
        ])
        .ok();
    assert!(cmd.is_ok(), "simulate failed: {}", cmd.err().unwrap());
    assert!(args_file.exists());

    let cmd = ex2d()
        .args(["simulate", &args_file.display().to_string(), "--no-progress-bars"])
        .ok();
    assert!(cmd.is_ok(), "simulate failed: {}", cmd.err().unwrap());
    let image = read_image(&output).unwrap();
    assert!(image.ivar.iter().all(|&v| (v - 1.0 / 9.0).abs() < 1e-12));
}
