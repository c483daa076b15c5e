//! Bounded minimization of black-box objective functions.
//!
//! Objectives map a parameter vector to a cost. A NaN cost is treated as
//! infinitely bad. Returning [`f64::NEG_INFINITY`] asks the minimizer to stop
//! immediately and report the point that produced it.
#![warn(missing_docs)]

use std::fmt::Display;

pub mod de;
pub mod error;
pub mod lbfgsb;

#[cfg(test)]
mod tests;

pub use de::{DifferentialEvolution, Updating};
pub use error::{Error, Result};
pub use lbfgsb::Lbfgsb;

/// Why a minimizer stopped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Status {
    /// A convergence criterion was met.
    Converged,
    /// The iteration limit was reached.
    MaxIterations,
    /// The evaluation limit was reached.
    MaxEvaluations,
    /// The objective returned the stop sentinel.
    Stopped,
    /// The line search could not find a decrease.
    LineSearchFailed,
}

/// The outcome of a minimization.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizeResult {
    /// The best point found.
    pub x: Vec<f64>,
    /// The objective value at `x`.
    pub fun: f64,
    /// The number of iterations (or generations) performed.
    pub nit: usize,
    /// The number of objective evaluations.
    pub nfev: usize,
    /// Why the minimizer stopped.
    pub status: Status,
}

impl Status {
    /// Returns `true` if the minimizer ended normally.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Converged | Self::Stopped)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Converged => write!(f, "optimization terminated successfully"),
            Self::MaxIterations => write!(f, "maximum number of iterations exceeded"),
            Self::MaxEvaluations => write!(f, "maximum number of function evaluations exceeded"),
            Self::Stopped => write!(f, "stopped by objective"),
            Self::LineSearchFailed => write!(f, "abnormal termination in line search"),
        }
    }
}

impl OptimizeResult {
    /// Returns `true` if the minimizer ended normally.
    #[inline]
    pub fn success(&self) -> bool {
        self.status.is_success()
    }

    /// A human-readable description of why the minimizer stopped.
    pub fn message(&self) -> String {
        self.status.to_string()
    }
}

/// Marker returned when the objective requested a stop.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Stop;

/// An objective wrapper that counts evaluations and watches for the stop sentinel.
pub(crate) struct Objective<'a> {
    f: &'a mut dyn FnMut(&[f64]) -> f64,
    nfev: usize,
    stopped_at: Option<Vec<f64>>,
}

impl<'a> Objective<'a> {
    pub(crate) fn new(f: &'a mut dyn FnMut(&[f64]) -> f64) -> Self {
        Self {
            f,
            nfev: 0,
            stopped_at: None,
        }
    }

    pub(crate) fn call(&mut self, x: &[f64]) -> std::result::Result<f64, Stop> {
        self.nfev += 1;
        let value = (self.f)(x);
        if value == f64::NEG_INFINITY {
            tracing::debug!(nfev = self.nfev, "objective requested stop");
            self.stopped_at = Some(x.to_vec());
            return Err(Stop);
        }
        Ok(if value.is_nan() { f64::INFINITY } else { value })
    }

    pub(crate) fn nfev(&self) -> usize {
        self.nfev
    }

    /// The result reported after the objective requested a stop.
    pub(crate) fn stopped(&mut self, nit: usize) -> OptimizeResult {
        OptimizeResult {
            x: self.stopped_at.take().unwrap_or_default(),
            fun: f64::NEG_INFINITY,
            nit,
            nfev: self.nfev,
            status: Status::Stopped,
        }
    }
}

/// Checks that bounds are non-empty, finite, and ordered.
pub(crate) fn validate_bounds(bounds: &[(f64, f64)]) -> Result<()> {
    if bounds.is_empty() {
        return Err(Error::EmptyBounds);
    }
    for (index, &(lo, hi)) in bounds.iter().enumerate() {
        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return Err(Error::InvalidBounds { index, lo, hi });
        }
    }
    Ok(())
}

/// Clamps `x` into `bounds` component-wise.
pub(crate) fn clamp(x: &mut [f64], bounds: &[(f64, f64)]) {
    for (xi, &(lo, hi)) in x.iter_mut().zip(bounds) {
        *xi = xi.clamp(lo, hi);
    }
}
