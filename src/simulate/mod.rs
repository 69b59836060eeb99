// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Synthetic detector images.
//!
//! Spectra are projected through a PSF, and optionally Gaussian read noise and
//! Poisson photon noise are added. The noise is simple; it's only intended for
//! testing extractions.


use std::ops::Range;

use indicatif::{ParallelProgressIterator, ProgressBar, ProgressDrawTarget, ProgressStyle};
use ndarray::prelude::*;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};
use rayon::prelude::*;
use thiserror::Error;

use crate::{io::DetectorImage, psf::Psf, PROGRESS_BARS};

/// Project `flux` (shape `(num_spectra, num_wavelengths)`, in units of the image
/// per wavelength sample) of `spectra` through the PSF. Light landing off the
/// detector is lost.
pub fn project(
    psf: &dyn Psf,
    spectra: Range<usize>,
    wavelengths: &[f64],
    flux: ArrayView2<f64>,
) -> Array2<f64> {
    let (ny, nx) = psf.detector_shape();
    let progress = ProgressBar::with_draw_target(
        Some(spectra.len() as _),
        if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg:17}: [{wide_bar:.blue}] {pos:2}/{len:2} spectra ({elapsed_precise}<{eta_precise})").unwrap()
            .progress_chars("=> "),
    )
    .with_message("Projecting");

    // Each spectrum's contributions are found in parallel, but added to the
    // image in order, so the image is the same however many threads run.
    let contributions: Vec<Vec<(usize, usize, f64)>> = spectra
        .clone()
        .into_par_iter()
        .progress_with(progress.clone())
        .map(|ispec| {
            let row = flux.row(ispec - spectra.start);
            let mut pixels = vec![];
            for (&wavelength, &f) in wavelengths.iter().zip(row.iter()) {
                if f == 0.0 {
                    continue;
                }
                let spot = psf.spot(ispec, wavelength);
                for ((iy, ix), &w) in spot.weights.indexed_iter() {
                    let y = spot.ymin + iy as i64;
                    let x = spot.xmin + ix as i64;
                    if y < 0 || x < 0 || y >= ny as i64 || x >= nx as i64 {
                        continue;
                    }
                    pixels.push((y as usize, x as usize, w * f));
                }
            }
            pixels
        })
        .collect();
    progress.abandon();

    let mut image = Array2::zeros((ny, nx));
    for (y, x, v) in contributions.into_iter().flatten() {
        image[(y, x)] += v;
    }
    image
}

#[derive(Error, Debug)]
pub enum NoiseError {
    #[error("The read noise must be non-negative and finite, got {0}")]
    BadReadNoise(f64),

    #[error("Couldn't make a noise distribution: {0}")]
    Distribution(String),
}

/// Add noise to a noiseless image. `read_noise` is the standard deviation of
/// Gaussian noise added to every pixel; with `photon_noise`, each pixel is
/// also Poisson distributed about its (non-negative) model value.
///
/// The inverse variances are those of the noise model. A pixel without any
/// noise has unit inverse variance.
pub fn add_noise(
    model: ArrayView2<f64>,
    read_noise: f64,
    photon_noise: bool,
    seed: u64,
) -> Result<DetectorImage, NoiseError> {
    if !(read_noise >= 0.0) || !read_noise.is_finite() {
        return Err(NoiseError::BadReadNoise(read_noise));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let read_dist = if read_noise > 0.0 {
        Some(Normal::new(0.0, read_noise).map_err(|e| NoiseError::Distribution(e.to_string()))?)
    } else {
        None
    };

    let mut image = model.to_owned();
    let mut ivar = Array2::ones(model.dim());
    for (pixel, var) in image.iter_mut().zip(ivar.iter_mut()) {
        let mut variance = read_noise * read_noise;
        if photon_noise && *pixel > 0.0 {
            variance += *pixel;
            let dist =
                Poisson::new(*pixel).map_err(|e| NoiseError::Distribution(e.to_string()))?;
            *pixel = dist.sample(&mut rng);
        }
        if let Some(dist) = &read_dist {
            *pixel += dist.sample(&mut rng);
        }
        if variance > 0.0 {
            *var = 1.0 / variance;
        }
    }

    Ok(DetectorImage { image, ivar })
}
