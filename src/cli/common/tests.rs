// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests against the common command-line arguments.

use approx::assert_abs_diff_eq;
use serial_test::serial;
use tempfile::TempDir;

use super::*;
use crate::tests::write_test_psf;

#[test]
fn test_parse_wavelengths() {
    let grid = parse_wavelengths("8000,8200,1").unwrap();
    assert_abs_diff_eq!(grid.wavemin, 8000.0);
    assert_abs_diff_eq!(grid.step, 1.0);
    assert_eq!(grid.len, 200);

    let grid = parse_wavelengths("8000, 8200 ,0.5").unwrap();
    assert_eq!(grid.len, 400);

    for bad in ["8000,8200", "8000,8200,1,2", "a,b,c", ""] {
        assert!(
            matches!(
                parse_wavelengths(bad),
                Err(SpectraArgsError::BadWavelengths(_))
            ),
            "'{bad}' was accepted"
        );
    }
    assert!(matches!(
        parse_wavelengths("8200,8000,1"),
        Err(SpectraArgsError::Grid(GridError::Empty { .. }))
    ));
    assert!(matches!(
        parse_wavelengths("8000,8200,0"),
        Err(SpectraArgsError::Grid(GridError::BadStep(_)))
    ));
}

#[test]
fn test_spectra_args_defaults() {
    let tmp_dir = TempDir::new().unwrap();
    let psf = write_test_psf(tmp_dir.path());

    let selection = SpectraArgs {
        psf: Some(psf.clone()),
        wavelength: Some("8000,8200,1".to_string()),
        ..Default::default()
    }
    .parse()
    .unwrap();
    assert_eq!(selection.spectra, 0..20);
    assert_eq!(selection.wavelengths.len, 200);
    assert_eq!(selection.psf.num_spectra(), 20);

    let selection = SpectraArgs {
        psf: Some(psf),
        specmin: Some(5),
        wavelength: Some("8000,8200,1".to_string()),
        ..Default::default()
    }
    .parse()
    .unwrap();
    assert_eq!(selection.spectra, 5..20);
}

#[test]
fn test_bad_spectra_args() {
    let tmp_dir = TempDir::new().unwrap();
    let psf = write_test_psf(tmp_dir.path());
    let args = SpectraArgs {
        psf: Some(psf),
        wavelength: Some("8000,8200,1".to_string()),
        ..Default::default()
    };

    let result = SpectraArgs {
        psf: None,
        ..args.clone()
    }
    .parse();
    assert!(matches!(result, Err(SpectraArgsError::NoPsf)));

    let result = SpectraArgs {
        psf: Some(tmp_dir.path().join("missing.toml")),
        ..args.clone()
    }
    .parse();
    assert!(matches!(result, Err(SpectraArgsError::PsfDoesntExist(_))));

    let result = SpectraArgs {
        specmin: Some(20),
        ..args.clone()
    }
    .parse();
    assert!(matches!(
        result,
        Err(SpectraArgsError::SpecminTooBig {
            specmin: 20,
            num_spectra: 20
        })
    ));

    let result = SpectraArgs {
        specmin: Some(5),
        nspec: Some(16),
        ..args.clone()
    }
    .parse();
    assert!(matches!(
        result,
        Err(SpectraArgsError::TooManySpectra { .. })
    ));

    let result = SpectraArgs {
        nspec: Some(0),
        ..args.clone()
    }
    .parse();
    assert!(matches!(result, Err(SpectraArgsError::NoSpectra)));

    let result = SpectraArgs {
        wavelength: None,
        ..args
    }
    .parse();
    assert!(matches!(result, Err(SpectraArgsError::NoWavelengths)));
}

#[test]
fn test_bad_psf_file() {
    let tmp_dir = TempDir::new().unwrap();
    let psf = tmp_dir.path().join("psf.toml");
    std::fs::write(&psf, "type = \"gaussian\"\nnum_spectra = 0\n").unwrap();
    let result = SpectraArgs {
        psf: Some(psf),
        wavelength: Some("8000,8200,1".to_string()),
        ..Default::default()
    }
    .parse();
    assert!(matches!(result, Err(SpectraArgsError::Psf(_))));
}

#[test]
fn test_merge_prefers_cli() {
    let cli = SpectraArgs {
        specmin: Some(3),
        ..Default::default()
    };
    let file = SpectraArgs {
        psf: Some("psf.toml".into()),
        specmin: Some(1),
        nspec: Some(4),
        wavelength: None,
    };
    let merged = cli.merge(file);
    assert_eq!(merged.psf, Some("psf.toml".into()));
    assert_eq!(merged.specmin, Some(3));
    assert_eq!(merged.nspec, Some(4));
    assert_eq!(merged.wavelength, None);
}

#[test]
#[serial]
fn test_wavelengths_beyond_the_psf_warn() {
    let tmp_dir = TempDir::new().unwrap();
    let psf = write_test_psf(tmp_dir.path());
    take_warnings();

    SpectraArgs {
        psf: Some(psf),
        wavelength: Some("7900,8000,1".to_string()),
        ..Default::default()
    }
    .parse()
    .unwrap();
    let warnings = take_warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0][0].contains("extend beyond the PSF"));
}
