//! Limited-memory quasi-Newton minimization with bound constraints.
//!
//! Search directions come from the L-BFGS two-loop recursion. Components
//! that would leave the box at an active bound are dropped, and trial points
//! are projected back into the box during an Armijo backtracking line search.
//! Gradients are estimated with one-sided finite differences.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::{clamp, validate_bounds, Objective, OptimizeResult, Status, Stop};

const DEFAULT_EPS: f64 = 1e-8;
const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 20;
const CURVATURE_EPS: f64 = 1e-10;

/// Options for the bounded L-BFGS minimizer.
#[derive(Clone, Debug, PartialEq)]
pub struct Lbfgsb {
    /// Maximum number of iterations.
    pub maxiter: usize,
    /// Maximum number of objective evaluations, including gradient estimates.
    pub maxfun: usize,
    /// Stop when the relative decrease `(f_k - f_{k+1}) / max(|f_k|, |f_{k+1}|, 1)`
    /// drops to this value or below.
    pub ftol: f64,
    /// Stop when the largest projected gradient component drops to this value or below.
    pub gtol: f64,
    /// Finite-difference step per parameter.
    ///
    /// If shorter than the number of parameters, the last entry is reused.
    /// If empty, `1e-8` is used for all parameters.
    pub eps: Vec<f64>,
    /// Number of correction pairs kept.
    pub m: usize,
}

impl Default for Lbfgsb {
    fn default() -> Self {
        Self {
            maxiter: 15000,
            maxfun: 15000,
            ftol: 2.220446049250313e-9,
            gtol: 1e-5,
            eps: Vec::new(),
            m: 10,
        }
    }
}

struct Correction {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

impl Lbfgsb {
    /// Minimizes `f` within `bounds`, starting from `x0`.
    ///
    /// `x0` is clamped into the bounds before the first evaluation.
    pub fn minimize<F>(&self, mut f: F, x0: &[f64], bounds: &[(f64, f64)]) -> Result<OptimizeResult>
    where
        F: FnMut(&[f64]) -> f64,
    {
        validate_bounds(bounds)?;
        if x0.len() != bounds.len() {
            return Err(Error::DimensionMismatch {
                expected: bounds.len(),
                found: x0.len(),
            });
        }
        let mut objective = Objective::new(&mut f);
        Ok(self.run(&mut objective, x0, bounds))
    }

    pub(crate) fn run(
        &self,
        objective: &mut Objective<'_>,
        x0: &[f64],
        bounds: &[(f64, f64)],
    ) -> OptimizeResult {
        let mut nit = 0;
        match self.iterate(objective, x0, bounds, &mut nit) {
            Ok(result) => result,
            Err(Stop) => objective.stopped(nit),
        }
    }

    fn iterate(
        &self,
        objective: &mut Objective<'_>,
        x0: &[f64],
        bounds: &[(f64, f64)],
        nit: &mut usize,
    ) -> std::result::Result<OptimizeResult, Stop> {
        let start_nfev = objective.nfev();
        let mut x = x0.to_vec();
        clamp(&mut x, bounds);
        let mut fx = objective.call(&x)?;
        let mut g = self.gradient(objective, &x, fx, bounds)?;
        let mut memory: VecDeque<Correction> = VecDeque::with_capacity(self.m);

        let status = loop {
            if projected_gradient_norm(&x, &g, bounds) <= self.gtol {
                break Status::Converged;
            }
            if *nit >= self.maxiter {
                break Status::MaxIterations;
            }
            if objective.nfev() - start_nfev >= self.maxfun {
                break Status::MaxEvaluations;
            }

            let mut d = direction(&g, &memory);
            restrict(&mut d, &x, bounds);
            let mut slope = dot(&g, &d);
            if slope >= 0. && !memory.is_empty() {
                tracing::trace!("discarding curvature pairs after ascent direction");
                memory.clear();
                d = g.iter().map(|gi| -gi).collect();
                restrict(&mut d, &x, bounds);
                slope = dot(&g, &d);
            }
            if slope >= 0. {
                break Status::Converged;
            }

            let mut t = if memory.is_empty() {
                (1. / inf_norm(&d)).min(1.)
            } else {
                1.
            };
            let mut accepted = None;
            for _ in 0..MAX_BACKTRACKS {
                let mut trial = x.iter().zip(&d).map(|(xi, di)| xi + t * di).collect::<Vec<_>>();
                clamp(&mut trial, bounds);
                let predicted = dot(&g, &sub(&trial, &x));
                let ft = objective.call(&trial)?;
                if ft <= fx + ARMIJO * predicted {
                    accepted = Some((trial, ft));
                    break;
                }
                t *= 0.5;
            }
            let Some((x_new, f_new)) = accepted else {
                break Status::LineSearchFailed;
            };
            *nit += 1;

            let g_new = self.gradient(objective, &x_new, f_new, bounds)?;
            let s = sub(&x_new, &x);
            let y = sub(&g_new, &g);
            let sy = dot(&s, &y);
            if sy > CURVATURE_EPS * dot(&y, &y) {
                if memory.len() == self.m {
                    memory.pop_front();
                }
                if self.m > 0 {
                    memory.push_back(Correction { s, y, rho: 1. / sy });
                }
            }

            let decrease = (fx - f_new) / fx.abs().max(f_new.abs()).max(1.);
            x = x_new;
            fx = f_new;
            g = g_new;
            tracing::trace!(nit = *nit, fun = fx, "lbfgsb iteration");
            if decrease <= self.ftol {
                break Status::Converged;
            }
        };

        Ok(OptimizeResult {
            x,
            fun: fx,
            nit: *nit,
            nfev: objective.nfev(),
            status,
        })
    }

    fn step(&self, i: usize) -> f64 {
        self.eps
            .get(i)
            .or(self.eps.last())
            .copied()
            .unwrap_or(DEFAULT_EPS)
    }

    /// Forward differences, switching to backward differences at the upper bound.
    fn gradient(
        &self,
        objective: &mut Objective<'_>,
        x: &[f64],
        fx: f64,
        bounds: &[(f64, f64)],
    ) -> std::result::Result<Vec<f64>, Stop> {
        let mut g = vec![0.; x.len()];
        let mut probe = x.to_vec();
        for (i, &(lo, hi)) in bounds.iter().enumerate() {
            if hi <= lo {
                continue;
            }
            let mut h = self.step(i);
            if x[i] + h > hi {
                h = -h;
            }
            probe[i] = x[i] + h;
            let fh = objective.call(&probe)?;
            probe[i] = x[i];
            let gi = (fh - fx) / h;
            g[i] = if gi.is_finite() { gi } else { 0. };
        }
        Ok(g)
    }
}

fn direction(g: &[f64], memory: &VecDeque<Correction>) -> Vec<f64> {
    let mut q = g.to_vec();
    let mut alphas = Vec::with_capacity(memory.len());
    for c in memory.iter().rev() {
        let a = c.rho * dot(&c.s, &q);
        axpy(-a, &c.y, &mut q);
        alphas.push(a);
    }
    if let Some(c) = memory.back() {
        let gamma = dot(&c.s, &c.y) / dot(&c.y, &c.y);
        q.iter_mut().for_each(|qi| *qi *= gamma);
    }
    for (c, a) in memory.iter().zip(alphas.iter().rev()) {
        let b = c.rho * dot(&c.y, &q);
        axpy(a - b, &c.s, &mut q);
    }
    q.iter().map(|qi| -qi).collect()
}

/// Zeroes direction components that point out of the box at an active bound.
fn restrict(d: &mut [f64], x: &[f64], bounds: &[(f64, f64)]) {
    for ((di, &xi), &(lo, hi)) in d.iter_mut().zip(x).zip(bounds) {
        if (xi <= lo && *di < 0.) || (xi >= hi && *di > 0.) {
            *di = 0.;
        }
    }
}

fn projected_gradient_norm(x: &[f64], g: &[f64], bounds: &[(f64, f64)]) -> f64 {
    x.iter()
        .zip(g)
        .zip(bounds)
        .map(|((&xi, &gi), &(lo, hi))| ((xi - gi).clamp(lo, hi) - xi).abs())
        .fold(0., f64::max)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

fn axpy(a: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += a * xi;
    }
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0., |m, x| f64::max(m, x.abs()))
}
