// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;

use super::*;
use crate::tests::{count_cells, flat_image, flat_image_with_step, test_psf};

fn grid() -> WavelengthGrid {
    WavelengthGrid::from_range(8000.0, 8200.0, 1.0).unwrap()
}

fn job(spectra: Range<usize>) -> ExtractionJob {
    ExtractionJob {
        bundle_size: 5,
        wavelength_step: 40.0,
        ..ExtractionJob::new(spectra, grid())
    }
}

#[test]
fn test_plan_partitions_the_job() {
    let psf = test_psf();
    let job = ExtractionJob {
        bundle_size: 3,
        ..job(2..12)
    };
    let plan = job.plan(&psf).unwrap();
    assert_eq!(plan.window_samples, 40);
    assert_eq!(plan.ndiag, 4);
    // A spot is 9 pixels tall, with one sample to spare.
    assert_eq!(plan.border_samples, 10);
    // 4 bundles by 5 windows.
    assert_eq!(plan.tiles.len(), 20);
    assert_eq!(plan.tiles[0].spectra, 2..5);
    assert_eq!(plan.tiles.last().unwrap().spectra, 11..12);

    let counts = count_cells(
        10,
        200,
        plan.tiles
            .iter()
            .map(|t| (t.spectra.start - 2..t.spectra.end - 2, t.core.clone())),
    );
    assert!(counts.iter().all(|&c| c == 1));

    for tile in &plan.tiles {
        assert_eq!(tile.wavelengths.len(), 60);
        assert_abs_diff_eq!(
            tile.wavelengths[10],
            job.wavelengths.get(tile.core.start),
            epsilon = 1e-9
        );
        // The spots of the core wavelengths are entirely within the tile.
        for ispec in tile.spectra.clone() {
            for iwave in [tile.core.start, tile.core.end - 1] {
                let spot = psf.spot(ispec, job.wavelengths.get(iwave));
                let inside: f64 = spot.pixels_within(tile.pixel_box).map(|(_, _, w)| w).sum();
                assert_abs_diff_eq!(inside, 1.0, epsilon = 1e-12);
            }
        }
    }
    assert_abs_diff_eq!(plan.tiles[0].wavelengths[0], 7990.0);
}

#[test]
fn test_user_border_and_ndiag() {
    let psf = test_psf();
    let plan = ExtractionJob {
        border: Some(2.5),
        ndiag: Some(2),
        ..job(0..5)
    }
    .plan(&psf)
    .unwrap();
    assert_eq!(plan.ndiag, 2);
    assert_eq!(plan.border_samples, 3);

    // The border is never narrower than the resolution band.
    let plan = ExtractionJob {
        border: Some(0.0),
        ..job(0..5)
    }
    .plan(&psf)
    .unwrap();
    assert_eq!(plan.border_samples, 4);
}

#[test]
fn test_window_must_divide_the_range() {
    let psf = test_psf();
    let image = flat_image(&psf, 1.0);

    let bad = ExtractionJob {
        wavelength_step: 45.0,
        ..job(0..20)
    };
    assert!(matches!(
        bad.validate(&psf),
        Err(JobConfigError::RangeNotDivisible {
            num_samples: 200,
            window_samples: 45
        })
    ));
    // No tile is extracted.
    assert!(matches!(
        bad.run(&psf, &image),
        Err(TilingError::Config(JobConfigError::RangeNotDivisible { .. }))
    ));

    let bad = ExtractionJob {
        wavelength_step: 40.5,
        ..job(0..20)
    };
    assert!(matches!(
        bad.validate(&psf),
        Err(JobConfigError::WindowNotMultiple { .. })
    ));
}

#[test]
fn test_bad_jobs() {
    let psf = test_psf();
    assert!(matches!(
        job(15..25).validate(&psf),
        Err(JobConfigError::SpectraOutOfRange {
            start: 15,
            end: 25,
            num_spectra: 20
        })
    ));
    assert!(matches!(
        job(3..3).validate(&psf),
        Err(JobConfigError::NoSpectra)
    ));
    assert!(matches!(
        ExtractionJob {
            bundle_size: 0,
            ..job(0..5)
        }
        .validate(&psf),
        Err(JobConfigError::ZeroBundleSize)
    ));
    assert!(matches!(
        ExtractionJob {
            regularize: -1.0,
            ..job(0..5)
        }
        .validate(&psf),
        Err(JobConfigError::NegativeRegularisation(_))
    ));
    assert!(matches!(
        ExtractionJob {
            border: Some(f64::NAN),
            ..job(0..5)
        }
        .validate(&psf),
        Err(JobConfigError::NegativeBorder(_))
    ));
    assert!(matches!(
        ExtractionJob {
            psf_error: Some(-0.5),
            ..job(0..5)
        }
        .validate(&psf),
        Err(JobConfigError::NegativePsfError(_))
    ));

    let image = DetectorImage {
        image: Array2::zeros((10, 10)),
        ivar: Array2::zeros((10, 10)),
    };
    assert!(matches!(
        job(0..5).run(&psf, &image),
        Err(TilingError::Config(JobConfigError::ImageShape { .. }))
    ));
}

#[test]
fn test_flat_spectra_are_recovered() {
    let psf = test_psf();
    let image = flat_image(&psf, 1.0);
    let job = ExtractionJob {
        num_threads: Some(4),
        ..job(0..20)
    };

    let result = job.run(&psf, &image).unwrap();
    assert_eq!(result.spectra(), 0..20);
    assert_eq!(result.flux.dim(), (20, 200));
    assert_eq!(result.ivar.dim(), (20, 200));
    assert_eq!(result.resolution.dim(), (20, 9, 200));
    assert_eq!(result.ndiag(), 4);
    assert_abs_diff_eq!(result.flux, Array2::ones((20, 200)), epsilon = 1e-4);
    assert!(result.ivar.iter().all(|&v| v > 0.0 && v.is_finite()));
}

#[test]
fn test_tile_borders_need_regularisation() {
    // The spots of the outermost border wavelengths are only partly within a
    // tile's pixels, so not every flux bin is constrained.
    let psf = test_psf();
    let image = flat_image(&psf, 1.0);
    let job = ExtractionJob {
        bundle_size: 20,
        wavelength_step: 40.0,
        ..ExtractionJob::new(0..20, grid())
    };
    let result = job.run(&psf, &image).unwrap();
    assert_abs_diff_eq!(result.flux, Array2::ones((20, 200)), epsilon = 1e-4);

    let unregularised = ExtractionJob {
        regularize: 0.0,
        ..job
    };
    assert!(matches!(
        unregularised.run(&psf, &image),
        Err(TilingError::Tile {
            source: ExtractionError::RankDeficient { .. },
            ..
        })
    ));
}

#[test]
fn test_tiles_at_the_detector_edge() {
    let mut psf = test_psf();
    // The first spots hang off the bottom of the detector, and spectrum 0
    // hangs off its side.
    psf.x0 = 2.0;
    psf.y0 = 2.0;
    let image = flat_image(&psf, 1.0);
    let job = ExtractionJob {
        bundle_size: 5,
        wavelength_step: 40.0,
        ..ExtractionJob::new(0..5, WavelengthGrid::from_range(7950.0, 8030.0, 1.0).unwrap())
    };

    let plan = job.plan(&psf).unwrap();
    assert_eq!(plan.tiles.len(), 2);
    // The first border is before the PSF's wavelength range, and off the
    // detector.
    assert_abs_diff_eq!(plan.tiles[0].wavelengths[0], 7940.0);
    assert_eq!(plan.tiles[0].pixel_box.ymin, 0);
    assert_eq!(plan.tiles[0].pixel_box.xmin, 0);

    let result = job.run(&psf, &image).unwrap();
    assert_eq!(result.flux.dim(), (5, 80));
    assert!(result
        .ivar
        .slice(s![.., 1..79])
        .iter()
        .all(|&v| v > 0.0 && v.is_finite()));
    // There's no light before 7950 Å, so the first few samples are blurred
    // by the resolution.
    assert_abs_diff_eq!(
        result.flux.slice(s![.., 10..]),
        Array2::ones((5, 70)),
        epsilon = 1e-3
    );
}

#[test]
fn test_full_output() {
    let psf = test_psf();
    let image = flat_image(&psf, 1.0);
    let run = |num_threads| {
        ExtractionJob {
            full_output: true,
            num_threads: Some(num_threads),
            ..job(0..10)
        }
        .run(&psf, &image)
        .unwrap()
    };

    let plain = job(0..10).run(&psf, &image).unwrap();
    assert!(plain.diagnostics.is_none());
    let serial = run(1);
    assert_eq!(serial.flux, plain.flux);

    let diagnostics = serial.diagnostics.unwrap();
    assert_eq!(diagnostics.model.dim(), (320, 215));
    assert_eq!(diagnostics.pixmask_fraction.dim(), (10, 200));
    // The pixels of every tile, which only see spectra 0 to 9.
    let tiles = s![56..264, 0..105];
    assert_abs_diff_eq!(
        diagnostics.model.slice(tiles),
        image.image.slice(tiles),
        epsilon = 1e-4
    );
    // Pixels outside of the tiles aren't modelled.
    assert_eq!(diagnostics.model[(300, 50)], 0.0);
    assert_eq!(diagnostics.model[(150, 150)], 0.0);
    assert!(diagnostics.pixmask_fraction.iter().all(|&f| f.abs() < 1e-9));
    assert!(diagnostics.chi2pix.iter().all(|&c| (0.0..1e-6).contains(&c)));

    let parallel = run(3).diagnostics.unwrap();
    assert_eq!(parallel.model, diagnostics.model);
    assert_eq!(parallel.pixmask_fraction, diagnostics.pixmask_fraction);
    assert_eq!(parallel.chi2pix, diagnostics.chi2pix);
}

#[test]
fn test_flux_is_per_angstrom() {
    let mut psf = test_psf();
    psf.angstroms_per_pixel = 2.0;
    psf.sigma_y = 0.5;
    psf.wavemax = 8550.0;
    let image = flat_image_with_step(&psf, 2.0, 1.0);
    let grid = WavelengthGrid::from_range(8000.0, 8200.0, 2.0).unwrap();
    let job = ExtractionJob {
        bundle_size: 10,
        wavelength_step: 20.0,
        ..ExtractionJob::new(0..10, grid)
    };

    let result = job.run(&psf, &image).unwrap();
    assert_eq!(result.flux.dim(), (10, 100));
    // One unit of flux per 2 Å sample.
    assert_abs_diff_eq!(result.flux, Array2::from_elem((10, 100), 0.5), epsilon = 1e-4);
}

#[test]
fn test_results_dont_depend_on_threads() {
    let psf = test_psf();
    let image = flat_image(&psf, 1.0);
    let run = |num_threads| {
        ExtractionJob {
            num_threads: Some(num_threads),
            ..job(0..10)
        }
        .run(&psf, &image)
        .unwrap()
    };

    let serial = run(1);
    let parallel = run(3);
    assert_eq!(serial.flux, parallel.flux);
    assert_eq!(serial.ivar, parallel.ivar);
    assert_eq!(serial.resolution, parallel.resolution);
}

#[test]
fn test_failing_tile_fails_the_job() {
    let psf = test_psf();
    let mut image = flat_image(&psf, 1.0);
    image.ivar.fill(0.0);
    let job = ExtractionJob {
        regularize: 0.0,
        min_weight_fraction: 0.0,
        num_threads: Some(2),
        ..job(0..10)
    };

    match job.run(&psf, &image) {
        Err(TilingError::Tile {
            spectra, source, ..
        }) => {
            assert_eq!(spectra.len(), 5);
            assert!(matches!(source, ExtractionError::RankDeficient { .. }));
        }
        other => panic!("expected a tile error, got {other:?}"),
    }
}
