// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Linear wavelength grids.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::STEP_TOLERANCE;

/// A linear wavelength grid: `wavemin + i * step` for `i` in `0..len` \[Å\].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WavelengthGrid {
    pub wavemin: f64,
    pub step: f64,
    pub len: usize,
}

impl WavelengthGrid {
    pub fn new(wavemin: f64, step: f64, len: usize) -> Result<WavelengthGrid, GridError> {
        if !(step > 0.0) || !step.is_finite() {
            return Err(GridError::BadStep(step));
        }
        if !wavemin.is_finite() {
            return Err(GridError::BadStart(wavemin));
        }
        if len == 0 {
            return Err(GridError::Empty {
                wavemin,
                wavemax: wavemin,
            });
        }
        Ok(WavelengthGrid { wavemin, step, len })
    }

    /// The half-open grid `[wavemin, wavemax)` with the given step. A range
    /// that isn't a whole number of steps gets a final sample below `wavemax`.
    pub fn from_range(wavemin: f64, wavemax: f64, step: f64) -> Result<WavelengthGrid, GridError> {
        if !(step > 0.0) || !step.is_finite() {
            return Err(GridError::BadStep(step));
        }
        let num_steps = (wavemax - wavemin) / step;
        if !(num_steps > STEP_TOLERANCE) || !num_steps.is_finite() {
            return Err(GridError::Empty { wavemin, wavemax });
        }
        let len = (num_steps - STEP_TOLERANCE).ceil() as usize;
        WavelengthGrid::new(wavemin, step, len)
    }

    pub fn get(&self, i: usize) -> f64 {
        self.wavemin + i as f64 * self.step
    }

    /// The last sample of the grid.
    pub fn last(&self) -> f64 {
        self.get(self.len - 1)
    }

    /// The exclusive upper end of the grid.
    pub fn wavemax(&self) -> f64 {
        self.get(self.len)
    }

    pub fn values(&self) -> Vec<f64> {
        (0..self.len).map(|i| self.get(i)).collect()
    }

    /// Do the grids have the same samples?
    pub fn matches(&self, other: &WavelengthGrid) -> bool {
        self.len == other.len
            && (self.step - other.step).abs() <= STEP_TOLERANCE * self.step
            && (self.wavemin - other.wavemin).abs() <= STEP_TOLERANCE * self.step
    }
}

impl std::fmt::Display for WavelengthGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.3}..{:.3} Å in steps of {} Å ({} samples)",
            self.wavemin,
            self.wavemax(),
            self.step,
            self.len
        )
    }
}

#[derive(Error, Debug)]
pub enum GridError {
    #[error("The wavelength step must be positive and finite, got {0}")]
    BadStep(f64),

    #[error("The first wavelength must be finite, got {0}")]
    BadStart(f64),

    #[error("The wavelength range {wavemin}..{wavemax} contains no samples")]
    Empty { wavemin: f64, wavemax: f64 },
}
