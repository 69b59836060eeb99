// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision. Wavelengths are in Angstrom and pixel
coordinates are in detector pixels.
 */

/// The default number of spectra extracted together in one tile.
pub const DEFAULT_BUNDLE_SIZE: usize = 25;

/// If the user doesn't specify the wavelength window size, each tile keeps this
/// many wavelength samples.
pub const DEFAULT_WINDOW_SAMPLES: usize = 50;

/// The default amount added to the diagonal of the normal equations.
///
/// Only the core wavelengths of a tile are guaranteed to have their whole spot
/// within the tile's pixels. Border wavelengths whose spots are cut by the
/// pixel box aren't all constrained by the data, and without a ridge the normal
/// equations of every tile are singular. This is small enough not to bias
/// fluxes that the data do constrain.
pub const DEFAULT_REGULARIZE: f64 = 1e-10;

/// Flux bins with a total pixel weight below this fraction of the largest bin
/// weight have their diagonal raised to the floor.
pub const DEFAULT_MIN_WEIGHT_FRACTION: f64 = 1e-4;

/// The normal equations of a tile are considered rank deficient if their
/// smallest eigenvalue is at or below the largest eigenvalue multiplied by this
/// value.
pub const RANK_TOLERANCE: f64 = 1e-12;

/// Eigenvalues smaller than this fraction of the largest eigenvalue are
/// clamped when composing matrix functions.
pub(crate) const EIGEN_CLAMP_THRESHOLD: f64 = 10.0 * f64::EPSILON;

/// The resolution band keeps this many multiples of the dispersion width of the
/// broadest spot.
pub(crate) const NDIAG_SIGMAS: f64 = 9.0;

/// The default fractional error of a PSF model. With full output, this adds
/// `(psf_error * model)²` to the variance of every pixel when working out the
/// χ² of a fit.
pub const DEFAULT_PSF_ERROR: f64 = 0.01;

/// The default half-size of Gaussian spots, in units of their sigma.
pub const DEFAULT_GAUSSIAN_NSIGMA: f64 = 4.0;

/// Relative tolerance used when checking that a wavelength step is an integer
/// multiple of the grid sampling.
pub(crate) const STEP_TOLERANCE: f64 = 1e-6;

/// The default seed for simulated noise.
pub const DEFAULT_SEED: u64 = 1;
