// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{fs::File, io::Write, path::Path};

use approx::assert_abs_diff_eq;
use serial_test::serial;
use tempfile::{tempdir, TempDir};

use super::*;
use crate::{
    io::{read_spectra, write_image},
    tests::{flat_image, test_psf, write_test_psf},
};

/// Write a PSF and a noiseless image of flat spectra into `dir`, and get
/// arguments to extract spectra 0..10 from them.
fn setup(dir: &Path) -> ExtractArgs {
    let psf = write_test_psf(dir);
    let image = dir.join("image.fits");
    write_image(&image, &flat_image(&test_psf(), 1.0)).unwrap();

    ExtractArgs {
        args_file: None,
        spectra_args: SpectraArgs {
            psf: Some(psf),
            specmin: Some(0),
            nspec: Some(10),
            wavelength: Some("8000,8200,1".to_string()),
        },
        extract_args: ExtractCliArgs {
            image: Some(image),
            output: Some(dir.join("spectra.fits")),
            bundle_size: Some(5),
            wavelength_step: Some(40.0),
            num_threads: Some(2),
            ..Default::default()
        },
    }
}

#[test]
#[serial]
fn test_extract_flat_spectra() {
    let tmp_dir = TempDir::new().unwrap();
    let args = setup(tmp_dir.path());
    let output = args.extract_args.output.clone().unwrap();

    args.run(false).unwrap();
    let spectra = read_spectra(&output).unwrap();
    assert_eq!(spectra.spectra(), 0..10);
    assert_eq!(spectra.wavelengths.len, 200);
    assert_eq!(spectra.ndiag(), 4);
    assert_abs_diff_eq!(
        spectra.flux,
        ndarray::Array2::ones((10, 200)),
        epsilon = 1e-4
    );
    assert!(spectra.ivar.iter().all(|&v| v > 0.0));
}

#[test]
#[serial]
fn test_extract_full_output() {
    let tmp_dir = TempDir::new().unwrap();
    let mut args = setup(tmp_dir.path());
    args.extract_args.full_output = true;
    let output = args.extract_args.output.clone().unwrap();

    args.run(false).unwrap();
    let spectra = read_spectra(&output).unwrap();
    let diagnostics = spectra.diagnostics.unwrap();
    assert_eq!(diagnostics.model.dim(), (320, 215));
    assert_eq!(diagnostics.pixmask_fraction.dim(), (10, 200));
    assert_eq!(diagnostics.chi2pix.dim(), (10, 200));
    // The image is noiseless and every pixel is good.
    assert!(diagnostics.chi2pix.iter().all(|&c| (0.0..1e-6).contains(&c)));
    assert!(diagnostics.pixmask_fraction.iter().all(|&f| f.abs() < 1e-9));

    // The trace of spectrum 3 at 8100 Å.
    let image = flat_image(&test_psf(), 1.0);
    assert_abs_diff_eq!(
        diagnostics.model[(160, 40)],
        image.image[(160, 40)],
        epsilon = 1e-4
    );
    // Spectrum 15 wasn't extracted.
    assert_eq!(diagnostics.model[(160, 160)], 0.0);
}

#[test]
#[serial]
fn test_dry_run_writes_nothing() {
    let tmp_dir = TempDir::new().unwrap();
    let args = setup(tmp_dir.path());
    let output = args.extract_args.output.clone().unwrap();

    args.run(true).unwrap();
    assert!(!output.exists());
}

#[test]
#[serial]
fn test_window_must_divide_the_wavelengths() {
    let tmp_dir = TempDir::new().unwrap();
    let mut args = setup(tmp_dir.path());
    args.extract_args.wavelength_step = Some(45.0);
    let output = args.extract_args.output.clone().unwrap();

    let result = args.run(false);
    assert!(matches!(result, Err(Ex2dError::Config(_))));
    let err = result.unwrap_err().to_string();
    assert!(err.contains("isn't a multiple"), "{err}");
    assert!(!output.exists());
}

#[test]
#[serial]
fn test_bad_extract_args() {
    let tmp_dir = TempDir::new().unwrap();
    let args = setup(tmp_dir.path());

    let mut no_image = args.clone();
    no_image.extract_args.image = None;
    assert!(matches!(no_image.run(true), Err(Ex2dError::Config(_))));

    let mut missing_image = args.clone();
    missing_image.extract_args.image = Some(tmp_dir.path().join("missing.fits"));
    assert!(matches!(missing_image.run(true), Err(Ex2dError::Config(_))));

    let mut bad_output = args.clone();
    bad_output.extract_args.output = Some(tmp_dir.path().join("spectra.txt"));
    assert!(matches!(bad_output.run(true), Err(Ex2dError::Config(_))));

    let mut no_threads = args.clone();
    no_threads.extract_args.num_threads = Some(0);
    assert!(matches!(no_threads.run(true), Err(Ex2dError::Config(_))));

    let mut negative = args.clone();
    negative.extract_args.regularize = Some(-1.0);
    assert!(matches!(negative.run(true), Err(Ex2dError::Config(_))));

    let mut no_psf = args;
    no_psf.spectra_args.psf = None;
    assert!(matches!(no_psf.run(true), Err(Ex2dError::Psf(_))));
}

#[test]
#[serial]
fn test_args_become_a_job() {
    let tmp_dir = TempDir::new().unwrap();
    let mut args = setup(tmp_dir.path());
    args.extract_args.border = Some(2.5);
    args.extract_args.ndiag = Some(3);
    args.extract_args.regularize = Some(0.1);
    args.extract_args.decorrelate_fibers = true;
    args.extract_args.full_output = true;
    args.extract_args.psf_error = Some(0.05);

    let params = args.parse().unwrap();
    let job = &params.job;
    assert_eq!(job.spectra, 0..10);
    assert_eq!(job.bundle_size, 5);
    assert_abs_diff_eq!(job.wavelength_step, 40.0);
    assert_eq!(job.border, Some(2.5));
    assert_eq!(job.ndiag, Some(3));
    assert_abs_diff_eq!(job.regularize, 0.1);
    assert_abs_diff_eq!(job.min_weight_fraction, DEFAULT_MIN_WEIGHT_FRACTION);
    assert_eq!(job.decorrelation, Decorrelation::PerSpectrum);
    assert!(job.full_output);
    assert_eq!(job.psf_error, Some(0.05));
    assert_eq!(job.num_threads, Some(2));
}

#[test]
#[serial]
fn test_default_output() {
    let tmp_dir = TempDir::new().unwrap();
    let mut args = setup(tmp_dir.path());
    args.extract_args.output = None;
    let params = args.parse().unwrap();
    assert_eq!(params.output, PathBuf::from(DEFAULT_OUTPUT_SPECTRA_FILENAME));
}

#[track_caller]
fn test_args_with_arg_file(args: &ExtractArgs) {
    let temp_dir = tempdir().expect("Couldn't make tempdir");
    for filename in ["extract.toml", "extract.json"] {
        let arg_file = temp_dir.path().join(filename);
        let mut f = File::create(&arg_file).expect("couldn't make file");
        let ser = match filename.split('.').last() {
            Some("toml") => {
                toml::to_string_pretty(&args).expect("couldn't serialise ExtractArgs as toml")
            }
            Some("json") => {
                serde_json::to_string_pretty(&args).expect("couldn't serialise ExtractArgs as json")
            }
            _ => unreachable!(),
        };
        write!(&mut f, "{ser}").unwrap();
        drop(f);

        // The first argument is the binary name.
        let parsed_args = ExtractArgs::parse_from(["extract", &arg_file.display().to_string()])
            .merge()
            .unwrap();
        assert_eq!(parsed_args.extract_args.bundle_size, Some(5));
        assert_eq!(parsed_args.spectra_args.nspec, Some(10));
        parsed_args.run(true).expect("args happily ingested");

        // CLI arguments override those in the file.
        let parsed_args = ExtractArgs::parse_from([
            "extract",
            &arg_file.display().to_string(),
            "--bundle-size",
            "2",
            "--decorrelate-fibers",
        ])
        .merge()
        .unwrap();
        assert_eq!(parsed_args.extract_args.bundle_size, Some(2));
        assert_eq!(parsed_args.extract_args.wavelength_step, Some(40.0));
        assert!(parsed_args.extract_args.decorrelate_fibers);
        assert!(parsed_args.args_file.is_none());
    }
}

#[test]
#[serial]
fn test_arg_files() {
    let tmp_dir = TempDir::new().unwrap();
    let args = setup(tmp_dir.path());
    test_args_with_arg_file(&args);
}

#[test]
fn test_unknown_arg_file_type() {
    let tmp_dir = TempDir::new().unwrap();
    let arg_file = tmp_dir.path().join("extract.yaml");
    std::fs::write(&arg_file, "").unwrap();
    let result = ExtractArgs::parse_from(["extract", &arg_file.display().to_string()]).merge();
    assert!(matches!(result, Err(Ex2dError::ArgFile(_))));
}
