// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Extraction of many spectra over a long wavelength range by splitting the
//! problem into overlapping tiles.
//!
//! Each tile is a bundle of spectra by a window of wavelengths. The window is
//! padded by a border on both sides so that the PSF wings of wavelengths just
//! outside the window are modelled; after extraction the border is trimmed and
//! only the core of the tile is kept. Every (spectrum, wavelength) of the job
//! is in the core of exactly one tile.

mod error;
#[cfg(test)]
mod tests;

pub use error::{JobConfigError, TilingError};

use std::{ops::Range, thread};

use crossbeam_channel::bounded;
use crossbeam_utils::atomic::AtomicCell;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, trace};
use ndarray::prelude::*;
use scopeguard::defer_on_unwind;

use crate::{
    constants::{
        DEFAULT_BUNDLE_SIZE, DEFAULT_MIN_WEIGHT_FRACTION, DEFAULT_REGULARIZE,
        DEFAULT_WINDOW_SAMPLES, NDIAG_SIGMAS, STEP_TOLERANCE,
    },
    extraction::{
        extract_tile, Decorrelation, ExtractOptions, ExtractionError, TileDiagnostics,
        TileExtraction,
    },
    grid::WavelengthGrid,
    io::DetectorImage,
    psf::{PixelBox, Psf},
    spectra::{Diagnostics, ExtractedSpectra},
    PROGRESS_BARS,
};

/// Everything needed to extract a range of spectra over a wavelength grid.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub spectra: Range<usize>,

    /// The output wavelengths.
    pub wavelengths: WavelengthGrid,

    /// The number of spectra in each tile.
    pub bundle_size: usize,

    /// The wavelength range of each tile's core \[Å\]. Must be a whole number
    /// of wavelength samples.
    pub wavelength_step: f64,

    /// Extra wavelengths to model on each side of a tile's core \[Å\]. If not
    /// given, the border covers the extent of a PSF spot.
    pub border: Option<f64>,

    /// The half-width of the stored resolution band. If not given, it is
    /// derived from the PSF.
    pub ndiag: Option<usize>,

    pub regularize: f64,

    pub min_weight_fraction: f64,

    pub decorrelation: Decorrelation,

    /// Also produce a model image, the masked fraction of each flux bin and
    /// its `χ²`.
    pub full_output: bool,

    /// Overrides the PSF's fractional model error for the `χ²` of full output.
    pub psf_error: Option<f64>,

    /// The number of tiles to extract at once. If not given, this is the
    /// number of available cores.
    pub num_threads: Option<usize>,
}

/// A bundle of spectra by a window of wavelengths.
#[derive(Debug, Clone)]
pub struct Tile {
    pub spectra: Range<usize>,

    /// The indices into the job's wavelength grid that this tile is
    /// responsible for.
    pub core: Range<usize>,

    /// The wavelengths extracted for this tile; the core wavelengths padded by
    /// the border on each side.
    pub wavelengths: Vec<f64>,

    /// The pixels modelled by this tile.
    pub pixel_box: PixelBox,
}

#[derive(Debug, Clone)]
pub struct TilePlan {
    pub ndiag: usize,

    /// The number of wavelength samples in each border.
    pub border_samples: usize,

    /// The number of wavelength samples in each tile's core.
    pub window_samples: usize,

    pub tiles: Vec<Tile>,
}

/// The first, middle and last of a range.
fn ends_and_middle(range: &Range<usize>) -> [usize; 3] {
    [
        range.start,
        range.start + (range.len() - 1) / 2,
        range.end - 1,
    ]
}

impl ExtractionJob {
    /// A job with default tiling and solver settings.
    pub fn new(spectra: Range<usize>, wavelengths: WavelengthGrid) -> ExtractionJob {
        ExtractionJob {
            spectra,
            wavelength_step: DEFAULT_WINDOW_SAMPLES as f64 * wavelengths.step,
            wavelengths,
            bundle_size: DEFAULT_BUNDLE_SIZE,
            border: None,
            ndiag: None,
            regularize: DEFAULT_REGULARIZE,
            min_weight_fraction: DEFAULT_MIN_WEIGHT_FRACTION,
            decorrelation: Decorrelation::default(),
            full_output: false,
            psf_error: None,
            num_threads: None,
        }
    }

    /// Check the job against the PSF, and get the number of wavelength samples
    /// in each tile's core.
    pub fn validate(&self, psf: &dyn Psf) -> Result<usize, JobConfigError> {
        if self.bundle_size == 0 {
            return Err(JobConfigError::ZeroBundleSize);
        }
        if self.spectra.is_empty() {
            return Err(JobConfigError::NoSpectra);
        }
        if self.spectra.end > psf.num_spectra() {
            return Err(JobConfigError::SpectraOutOfRange {
                start: self.spectra.start,
                end: self.spectra.end,
                num_spectra: psf.num_spectra(),
            });
        }
        if !(self.regularize >= 0.0) || !self.regularize.is_finite() {
            return Err(JobConfigError::NegativeRegularisation(self.regularize));
        }
        if !(self.min_weight_fraction >= 0.0) || !self.min_weight_fraction.is_finite() {
            return Err(JobConfigError::NegativeMinWeight(self.min_weight_fraction));
        }
        if let Some(border) = self.border {
            if !(border >= 0.0) || !border.is_finite() {
                return Err(JobConfigError::NegativeBorder(border));
            }
        }
        if let Some(psf_error) = self.psf_error {
            if !(psf_error >= 0.0) || !psf_error.is_finite() {
                return Err(JobConfigError::NegativePsfError(psf_error));
            }
        }

        let samples = self.wavelength_step / self.wavelengths.step;
        let window_samples = samples.round();
        if !(window_samples >= 1.0) || (samples - window_samples).abs() > STEP_TOLERANCE {
            return Err(JobConfigError::WindowNotMultiple {
                wavelength_step: self.wavelength_step,
                step: self.wavelengths.step,
            });
        }
        let window_samples = window_samples as usize;
        // Partial windows aren't allowed.
        if self.wavelengths.len % window_samples != 0 {
            return Err(JobConfigError::RangeNotDivisible {
                num_samples: self.wavelengths.len,
                window_samples,
            });
        }

        Ok(window_samples)
    }

    /// The half-width of the resolution band, either as specified or wide
    /// enough for 9 sigma of the PSF's dispersion-direction width. It never
    /// exceeds half of a PSF spot.
    fn ndiag(&self, psf: &dyn Psf) -> usize {
        if let Some(ndiag) = self.ndiag {
            return ndiag;
        }

        let dw = self.wavelengths.step;
        let (wavemin, wavemax) = psf.wavelength_range();
        let wavemid = 0.5 * (wavemin + wavemax);
        let mut ndiag = 0;
        for ispec in ends_and_middle(&self.spectra) {
            for wavelength in [wavemin, wavemid, wavemax] {
                let n = (NDIAG_SIGMAS * psf.wdisp(ispec, wavelength) / dw).round();
                ndiag = ndiag.max(n as usize);
            }
        }

        let (spot_ny, spot_nx) = psf.spot(self.spectra.start, wavemid).weights.dim();
        ndiag.min(spot_ny / 2).min(spot_nx / 2)
    }

    /// The number of wavelength samples in each tile's border. This is never
    /// less than `ndiag`.
    fn border_samples(&self, psf: &dyn Psf, ndiag: usize) -> usize {
        let dw = self.wavelengths.step;
        let samples = match self.border {
            Some(border) => (border / dw - STEP_TOLERANCE).ceil().max(0.0) as usize,
            None => {
                let grid = &self.wavelengths;
                let wavelengths = [
                    grid.wavemin,
                    grid.get((grid.len - 1) / 2),
                    grid.last(),
                ];
                let mut extent: f64 = 0.0;
                for ispec in ends_and_middle(&self.spectra) {
                    for &wavelength in &wavelengths {
                        extent = extent.max(psf.spot_wavelength_extent(ispec, wavelength));
                    }
                }
                // Don't let rounding of the extent add a sample.
                (extent / dw - STEP_TOLERANCE).ceil().max(0.0) as usize + 1
            }
        };
        samples.max(ndiag)
    }

    /// Work out how to tile this job.
    pub fn plan(&self, psf: &dyn Psf) -> Result<TilePlan, JobConfigError> {
        let window_samples = self.validate(psf)?;
        let ndiag = self.ndiag(psf);
        let border_samples = self.border_samples(psf, ndiag);
        debug!("ndiag {ndiag}, border of {border_samples} samples, windows of {window_samples} samples");

        let grid = &self.wavelengths;
        let mut tiles = vec![];
        for lo in self.spectra.clone().step_by(self.bundle_size) {
            let bundle = lo..(lo + self.bundle_size).min(self.spectra.end);
            for start in (0..grid.len).step_by(window_samples) {
                let core = start..start + window_samples;
                let wavelengths = (0..window_samples + 2 * border_samples)
                    .map(|i| {
                        grid.wavemin
                            + (start as f64 + i as f64 - border_samples as f64) * grid.step
                    })
                    .collect();
                let pixel_box = psf.xyrange(
                    bundle.clone(),
                    (grid.get(core.start), grid.get(core.end - 1)),
                );
                tiles.push(Tile {
                    spectra: bundle.clone(),
                    core,
                    wavelengths,
                    pixel_box,
                });
            }
        }

        Ok(TilePlan {
            ndiag,
            border_samples,
            window_samples,
            tiles,
        })
    }

    /// Extract every spectrum of this job from the detector image. Tiles are
    /// extracted in parallel and stitched together; fluxes are converted to per
    /// Angstrom.
    pub fn run(
        &self,
        psf: &dyn Psf,
        image: &DetectorImage,
    ) -> Result<ExtractedSpectra, TilingError> {
        let detector = psf.detector_shape();
        if image.image.dim() != detector || image.ivar.dim() != detector {
            return Err(JobConfigError::ImageShape {
                image: image.image.dim(),
                ivar: image.ivar.dim(),
                detector,
            }
            .into());
        }
        let plan = self.plan(psf)?;
        let TilePlan {
            ndiag,
            border_samples,
            window_samples,
            tiles,
        } = &plan;
        info!(
            "Extracting spectra {:?} in {} tiles ({} spectra x {} wavelengths, border of {} samples, ndiag {})",
            self.spectra,
            tiles.len(),
            self.bundle_size,
            window_samples,
            border_samples,
            ndiag
        );

        let options = ExtractOptions {
            regularize: self.regularize,
            min_weight_fraction: self.min_weight_fraction,
            ndiag: *ndiag,
            decorrelation: self.decorrelation,
            full_output: self.full_output,
            psf_error: self.psf_error,
        };
        let num_spectra = self.spectra.len();
        let num_wavelengths = self.wavelengths.len;
        let mut flux = Array2::zeros((num_spectra, num_wavelengths));
        let mut ivar = Array2::zeros((num_spectra, num_wavelengths));
        let mut resolution = Array3::zeros((num_spectra, 2 * ndiag + 1, num_wavelengths));
        let mut fit = self.full_output.then(|| JobFit {
            pixmask_fraction: Array2::zeros((num_spectra, num_wavelengths)),
            chi2pix: Array2::zeros((num_spectra, num_wavelengths)),
            tile_models: vec![None; tiles.len()],
        });

        // Tiles are extracted in parallel, so the dense algebra of each tile
        // is serial.
        faer::set_global_parallelism(faer::Par::Seq);
        let num_threads = self
            .num_threads
            .unwrap_or_else(rayon::current_num_threads)
            .clamp(1, tiles.len().max(1));
        let (tx_tile, rx_tile) = bounded(num_threads);
        let (tx_result, rx_result) = bounded(num_threads);

        let multi_progress = MultiProgress::with_draw_target(if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        });
        let tile_progress = multi_progress.add(
            ProgressBar::new(tiles.len() as _)
                .with_style(
                    ProgressStyle::default_bar()
                        .template("{msg:17}: [{wide_bar:.blue}] {pos:2}/{len:2} tiles ({elapsed_precise}<{eta_precise})").unwrap()
                        .progress_chars("=> "),
                )
                .with_position(0)
                .with_message("Extracting"),
        );

        let error = AtomicCell::new(false);
        let mut first_error = None;
        thread::scope(|scope| {
            // Tile feeding thread.
            let feed_handle = thread::Builder::new()
                .name("feed".to_string())
                .spawn_scoped(scope, || {
                    defer_on_unwind! { error.store(true); }
                    for indexed_tile in tiles.iter().enumerate() {
                        // Should we continue?
                        if error.load() {
                            break;
                        }
                        // If we can't send, all of the workers have exited.
                        if tx_tile.send(indexed_tile).is_err() {
                            break;
                        }
                    }
                    drop(tx_tile);
                })
                .expect("OS can create threads");

            let worker_handles: Vec<_> = (0..num_threads)
                .map(|i| {
                    let rx_tile = rx_tile.clone();
                    let tx_result = tx_result.clone();
                    let error = &error;
                    let options = &options;
                    thread::Builder::new()
                        .name(format!("tile-{i}"))
                        .spawn_scoped(scope, move || {
                            defer_on_unwind! { error.store(true); }
                            for (i_tile, tile) in rx_tile.iter() {
                                if error.load() {
                                    break;
                                }
                                let result = extract_one(psf, image, tile, options);
                                if result.is_err() {
                                    error.store(true);
                                }
                                if tx_result.send((i_tile, tile, result)).is_err() {
                                    break;
                                }
                            }
                        })
                        .expect("OS can create threads")
                })
                .collect();
            // Only the workers hold these now; the channels close when the
            // workers are done.
            drop(rx_tile);
            drop(tx_result);

            for (i_tile, tile, result) in rx_result.iter() {
                match result {
                    Ok(mut extraction) => {
                        stitch(
                            tile,
                            &extraction,
                            self.spectra.start,
                            *border_samples,
                            flux.view_mut(),
                            ivar.view_mut(),
                            resolution.view_mut(),
                        );
                        if let (Some(fit), Some(diagnostics)) =
                            (fit.as_mut(), extraction.diagnostics.take())
                        {
                            fit.stitch(tile, i_tile, diagnostics, self.spectra.start, *border_samples);
                        }
                        tile_progress.inc(1);
                    }
                    Err(e) => {
                        if first_error.is_none() {
                            first_error = Some(TilingError::Tile {
                                spectra: tile.spectra.clone(),
                                wavemin: self.wavelengths.get(tile.core.start),
                                wavemax: self.wavelengths.get(tile.core.end - 1),
                                source: e,
                            });
                        }
                    }
                }
            }

            feed_handle.join().unwrap();
            for handle in worker_handles {
                handle.join().unwrap();
            }
        });

        if let Some(e) = first_error {
            tile_progress.abandon_with_message("Extraction failed");
            return Err(e);
        }
        tile_progress.abandon_with_message("Finished extracting");

        // Fluxes are per wavelength sample; convert them to per Angstrom.
        let dw = self.wavelengths.step;
        flux /= dw;
        ivar *= dw * dw;

        let diagnostics = fit.map(|fit| fit.into_diagnostics(tiles, detector));

        Ok(ExtractedSpectra {
            specmin: self.spectra.start,
            wavelengths: self.wavelengths,
            flux,
            ivar,
            resolution,
            diagnostics,
        })
    }
}

/// The full-output products of a job while its tiles are being extracted.
struct JobFit {
    pixmask_fraction: Array2<f64>,
    chi2pix: Array2<f64>,

    /// The model of each tile's pixel box, in plan order.
    tile_models: Vec<Option<Array2<f64>>>,
}

impl JobFit {
    fn stitch(
        &mut self,
        tile: &Tile,
        i_tile: usize,
        diagnostics: TileDiagnostics,
        specmin: usize,
        border_samples: usize,
    ) {
        let rows = tile.spectra.start - specmin..tile.spectra.end - specmin;
        let core = border_samples..border_samples + tile.core.len();
        self.pixmask_fraction
            .slice_mut(s![rows.clone(), tile.core.clone()])
            .assign(&diagnostics.pixmask_fraction.slice(s![.., core.clone()]));
        self.chi2pix
            .slice_mut(s![rows, tile.core.clone()])
            .assign(&diagnostics.chi2pix.slice(s![.., core]));
        self.tile_models[i_tile] = Some(diagnostics.model);
    }

    /// Put the tile models together into a model of the detector. Within a
    /// bundle, pixel rows shared by consecutive windows are taken from the
    /// later window; the models of different bundles are summed. Tiles are
    /// added in plan order, so the model doesn't depend on the order that
    /// tiles finished in.
    fn into_diagnostics(self, tiles: &[Tile], detector: (usize, usize)) -> Diagnostics {
        let mut model = Array2::zeros(detector);
        for (i, (tile, tile_model)) in tiles.iter().zip(&self.tile_models).enumerate() {
            let tile_model = match tile_model {
                Some(m) => m,
                None => continue,
            };
            let next_rows = tiles
                .get(i + 1)
                .filter(|next| next.spectra == tile.spectra)
                .map(|next| next.pixel_box.ymin..next.pixel_box.ymax);
            let b = tile.pixel_box;
            for (y, tile_row) in (b.ymin..b.ymax).zip(tile_model.outer_iter()) {
                if next_rows.as_ref().is_some_and(|r| r.contains(&y)) {
                    continue;
                }
                let mut row = model.slice_mut(s![y, b.xmin..b.xmax]);
                row += &tile_row;
            }
        }

        Diagnostics {
            model,
            pixmask_fraction: self.pixmask_fraction,
            chi2pix: self.chi2pix,
        }
    }
}

fn extract_one(
    psf: &dyn Psf,
    image: &DetectorImage,
    tile: &Tile,
    options: &ExtractOptions,
) -> Result<TileExtraction, ExtractionError> {
    let PixelBox {
        xmin,
        xmax,
        ymin,
        ymax,
    } = tile.pixel_box;
    trace!(
        "Extracting spectra {:?}, wavelengths {:.3}..{:.3}",
        tile.spectra,
        tile.wavelengths[0],
        tile.wavelengths[tile.wavelengths.len() - 1]
    );
    extract_tile(
        image.image.slice(s![ymin..ymax, xmin..xmax]),
        image.ivar.slice(s![ymin..ymax, xmin..xmax]),
        psf,
        tile.spectra.clone(),
        &tile.wavelengths,
        tile.pixel_box,
        options,
    )
}

/// Copy the core of a tile's extraction into the job's arrays.
fn stitch(
    tile: &Tile,
    extraction: &TileExtraction,
    specmin: usize,
    border_samples: usize,
    mut flux: ArrayViewMut2<f64>,
    mut ivar: ArrayViewMut2<f64>,
    mut resolution: ArrayViewMut3<f64>,
) {
    let rows = tile.spectra.start - specmin..tile.spectra.end - specmin;
    let core = border_samples..border_samples + tile.core.len();
    flux.slice_mut(s![rows.clone(), tile.core.clone()])
        .assign(&extraction.flux.slice(s![.., core.clone()]));
    ivar.slice_mut(s![rows.clone(), tile.core.clone()])
        .assign(&extraction.ivar.slice(s![.., core.clone()]));
    resolution
        .slice_mut(s![rows, .., tile.core.clone()])
        .assign(&extraction.resolution.slice(s![.., .., core]));
}
