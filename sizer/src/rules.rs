//! Process design rules for device dimensions.

use serde::{Deserialize, Serialize};

use crate::config::ParameterBound;

/// Slack for grid snapping of bound endpoints that are already on the grid.
const GRID_SLACK: f64 = 1e-9;

/// Manufacturing grid and minimum device dimensions, in microns.
///
/// Defaults are the SKY130 1.8V device rules.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignRules {
    /// Manufacturing grid step.
    pub grid: f64,
    /// Minimum channel length.
    pub min_length: f64,
    /// Minimum channel width.
    pub min_width: f64,
}

impl Default for DesignRules {
    fn default() -> Self {
        Self {
            grid: 0.005,
            min_length: 0.15,
            min_width: 0.42,
        }
    }
}

impl DesignRules {
    /// The process minimum for a parameter, if it names a length or width.
    ///
    /// A name containing `L` is a length, otherwise one containing `W` is a width.
    pub fn floor(&self, parameter: &str) -> Option<f64> {
        if parameter.contains('L') {
            Some(self.min_length)
        } else if parameter.contains('W') {
            Some(self.min_width)
        } else {
            None
        }
    }

    /// Snaps `value` to the nearest grid point.
    #[inline]
    pub fn quantize(&self, value: f64) -> f64 {
        (value / self.grid).round() * self.grid
    }

    /// The legal range for a bound: the declared range raised to the process
    /// floor, shrunk to grid points.
    ///
    /// Returns `None` if no grid point lies in the range.
    fn grid_range(&self, lo: f64, hi: f64) -> Option<(f64, f64)> {
        let lo = ((lo / self.grid) - GRID_SLACK).ceil() * self.grid;
        let hi = ((hi / self.grid) + GRID_SLACK).floor() * self.grid;
        (lo <= hi).then_some((lo, hi))
    }

    /// Corrects one candidate value for `bound`.
    ///
    /// The result lies within the bound and at or above the process floor
    /// (unless the bound's maximum is below the floor). Correcting a
    /// corrected value leaves it unchanged.
    pub fn correct_value(&self, value: f64, bound: &ParameterBound) -> f64 {
        let floor = self.floor(&bound.parameter).unwrap_or(f64::NEG_INFINITY);
        let lo = floor.max(bound.min_value).min(bound.max_value);
        let hi = bound.max_value;
        if self.grid <= 0. || self.grid.is_nan() {
            return clamp(value, lo, hi);
        }
        match self.grid_range(lo, hi) {
            Some((lo, hi)) => clamp(self.quantize(value), lo, hi),
            // No grid point is legal; clamping alone keeps the result stable.
            None => clamp(value, lo, hi),
        }
    }

    /// Corrects a candidate vector, index by index against `bounds`.
    pub fn correct(&self, x: &[f64], bounds: &[ParameterBound]) -> Vec<f64> {
        x.iter()
            .zip(bounds)
            .map(|(&v, bound)| self.correct_value(v, bound))
            .collect()
    }
}

#[inline]
fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}
