// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helpful functions and PSFs for tests.

use std::ops::Range;

use ndarray::prelude::*;

use crate::{
    grid::WavelengthGrid,
    io::DetectorImage,
    psf::{GaussianPsf, Psf, PsfType, Spot},
    simulate::project,
};

/// Twenty well-separated spectra with 1 Å per pixel dispersion, covering
/// 7950 to 8250 Å.
pub(crate) fn test_psf() -> GaussianPsf {
    GaussianPsf {
        num_spectra: 20,
        npix_x: 215,
        npix_y: 320,
        wavemin: 7950.0,
        wavemax: 8250.0,
        x0: 10.0,
        y0: 10.0,
        fiber_spacing: 10.0,
        bundle_size: None,
        bundle_gap: 0.0,
        angstroms_per_pixel: 1.0,
        x_slope: 0.0,
        sigma_x: 1.0,
        sigma_y: 1.0,
        nsigma: 4.0,
        psf_error: 0.01,
    }
}

/// A noiseless image of every spectrum of `psf` with constant flux (per
/// wavelength sample) over the whole PSF wavelength range, sampled on the
/// integer-Angstrom grid. Every pixel has unit inverse variance.
pub(crate) fn flat_image(psf: &dyn Psf, flux: f64) -> DetectorImage {
    flat_image_with_step(psf, 1.0, flux)
}

/// As [`flat_image`], but with wavelength samples `step` Angstroms apart.
pub(crate) fn flat_image_with_step(psf: &dyn Psf, step: f64, flux: f64) -> DetectorImage {
    let (wavemin, wavemax) = psf.wavelength_range();
    let grid = WavelengthGrid::from_range(wavemin.ceil(), wavemax.floor() + 1.0, step).unwrap();
    let spectra = 0..psf.num_spectra();
    let fluxes = Array2::from_elem((spectra.len(), grid.len), flux);
    let image = project(psf, spectra, &grid.values(), fluxes.view());
    let ivar = Array2::ones(image.dim());
    DetectorImage { image, ivar }
}

/// A PSF whose spots never share pixels: spectrum `i` at wavelength sample `j`
/// (wavelengths are `wavemin + j`) puts 3/4 of its flux into pixel
/// `(2j, i)` and 1/4 into pixel `(2j + 1, i)`.
pub(crate) struct DisjointPsf {
    pub(crate) num_spectra: usize,
    pub(crate) num_wavelengths: usize,
    pub(crate) wavemin: f64,
}

impl DisjointPsf {
    fn row(&self, wavelength: f64) -> i64 {
        2 * (wavelength - self.wavemin).round() as i64
    }
}

impl Psf for DisjointPsf {
    fn get_psf_type(&self) -> PsfType {
        PsfType::Gaussian
    }

    fn num_spectra(&self) -> usize {
        self.num_spectra
    }

    fn detector_shape(&self) -> (usize, usize) {
        (2 * self.num_wavelengths, self.num_spectra)
    }

    fn wavelength_range(&self) -> (f64, f64) {
        (
            self.wavemin,
            self.wavemin + self.num_wavelengths as f64 - 1.0,
        )
    }

    fn xy(&self, ispec: usize, wavelength: f64) -> (f64, f64) {
        (ispec as f64, self.row(wavelength) as f64 + 0.25)
    }

    fn wdisp(&self, _ispec: usize, _wavelength: f64) -> f64 {
        0.25
    }

    fn spot(&self, ispec: usize, wavelength: f64) -> Spot {
        Spot {
            xmin: ispec as i64,
            ymin: self.row(wavelength),
            weights: array![[0.75], [0.25]],
        }
    }
}

/// Count how many times each `(spectrum, wavelength)` cell is covered by the
/// given ranges.
pub(crate) fn count_cells(
    num_spectra: usize,
    num_wavelengths: usize,
    cells: impl Iterator<Item = (Range<usize>, Range<usize>)>,
) -> Array2<u32> {
    let mut counts = Array2::zeros((num_spectra, num_wavelengths));
    for (spectra, wavelengths) in cells {
        counts.slice_mut(s![spectra, wavelengths]).map_inplace(|c| *c += 1);
    }
    counts
}

/// Write [`test_psf`] to a json PSF file in `dir`.
pub(crate) fn write_test_psf(dir: &std::path::Path) -> std::path::PathBuf {
    let file = dir.join("psf.json");
    let contents = serde_json::to_string_pretty(&crate::psf::PsfConfig::Gaussian(test_psf()))
        .expect("the test PSF is serialisable");
    std::fs::write(&file, contents).expect("can write the test PSF");
    file
}
