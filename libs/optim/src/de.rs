//! Differential evolution.
//!
//! Uses the `best1bin` strategy on a Latin hypercube initialized population.
//! The population lives in the unit cube and is scaled to the bounds only
//! when evaluating the objective.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::{validate_bounds, Lbfgsb, Objective, OptimizeResult, Status, Stop};

/// When trial vectors replace population members.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Updating {
    /// A better trial replaces its target right away and may become the
    /// donor base for the rest of the generation.
    #[default]
    Immediate,
    /// A whole generation of trials is evaluated before any replacement.
    Deferred,
}

/// Options for differential evolution.
#[derive(Clone, Debug, PartialEq)]
pub struct DifferentialEvolution {
    /// Maximum number of generations.
    pub maxiter: usize,
    /// Population size multiplier.
    ///
    /// The population has `max(5, popsize * n)` members for `n` parameters.
    pub popsize: usize,
    /// Relative convergence tolerance.
    pub tol: f64,
    /// Absolute convergence tolerance.
    pub atol: f64,
    /// Differential weight range. A fresh weight is drawn uniformly from
    /// this range every generation.
    pub mutation: (f64, f64),
    /// Crossover probability.
    pub recombination: f64,
    /// Random seed. Unseeded runs draw from system entropy.
    pub seed: Option<u64>,
    /// Population update scheme.
    pub updating: Updating,
    /// Local refinement of the best member after the search.
    pub polish: Option<Lbfgsb>,
}

impl Default for DifferentialEvolution {
    fn default() -> Self {
        Self {
            maxiter: 1000,
            popsize: 15,
            tol: 0.01,
            atol: 0.,
            mutation: (0.5, 1.),
            recombination: 0.7,
            seed: None,
            updating: Updating::Immediate,
            polish: Some(Lbfgsb::default()),
        }
    }
}

struct Population {
    members: Vec<Vec<f64>>,
    energies: Vec<f64>,
    bounds: Vec<(f64, f64)>,
}

impl Population {
    fn scale(&self, unit: &[f64]) -> Vec<f64> {
        unit.iter()
            .zip(&self.bounds)
            .map(|(u, &(lo, hi))| lo + u * (hi - lo))
            .collect()
    }

    fn best(&self) -> usize {
        self.energies
            .iter()
            .enumerate()
            .fold(0, |best, (i, &e)| if e < self.energies[best] { i } else { best })
    }

    /// Moves the best member to index 0.
    fn promote_best(&mut self) {
        let best = self.best();
        self.members.swap(0, best);
        self.energies.swap(0, best);
    }

    fn converged(&self, tol: f64, atol: f64) -> bool {
        let n = self.energies.len() as f64;
        let mean = self.energies.iter().sum::<f64>() / n;
        let var = self.energies.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();
        std.is_finite() && std <= atol + tol * mean.abs()
    }
}

impl DifferentialEvolution {
    /// Minimizes `f` within `bounds`.
    pub fn minimize<F>(&self, mut f: F, bounds: &[(f64, f64)]) -> Result<OptimizeResult>
    where
        F: FnMut(&[f64]) -> f64,
    {
        validate_bounds(bounds)?;
        let mut objective = Objective::new(&mut f);
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut nit = 0;
        let result = match self.evolve(&mut objective, &mut rng, bounds, &mut nit) {
            Ok(result) => result,
            Err(Stop) => return Ok(objective.stopped(nit)),
        };
        tracing::debug!(
            nit = result.nit,
            nfev = result.nfev,
            fun = result.fun,
            "differential evolution finished: {}",
            result.status
        );

        let Some(polish) = &self.polish else {
            return Ok(result);
        };
        let polished = polish.run(&mut objective, &result.x, bounds);
        if polished.status == Status::Stopped {
            return Ok(OptimizeResult { nit, ..polished });
        }
        Ok(if polished.fun < result.fun {
            tracing::debug!(fun = polished.fun, "polishing improved the solution");
            OptimizeResult {
                x: polished.x,
                fun: polished.fun,
                nfev: polished.nfev,
                ..result
            }
        } else {
            OptimizeResult {
                nfev: polished.nfev,
                ..result
            }
        })
    }

    fn population_size(&self, n: usize) -> usize {
        (self.popsize * n).max(5)
    }

    fn evolve(
        &self,
        objective: &mut Objective<'_>,
        rng: &mut StdRng,
        bounds: &[(f64, f64)],
        nit: &mut usize,
    ) -> std::result::Result<OptimizeResult, Stop> {
        let n = bounds.len();
        let size = self.population_size(n);
        let mut pop = Population {
            members: latin_hypercube(rng, size, n),
            energies: Vec::with_capacity(size),
            bounds: bounds.to_vec(),
        };
        for i in 0..size {
            let x = pop.scale(&pop.members[i]);
            let e = objective.call(&x)?;
            pop.energies.push(e);
        }
        pop.promote_best();

        let mut status = Status::MaxIterations;
        while *nit < self.maxiter {
            *nit += 1;
            let scale = self.draw_scale(rng);
            match self.updating {
                Updating::Immediate => {
                    for candidate in 0..size {
                        let trial = self.trial(rng, &pop, candidate, scale);
                        let e = objective.call(&pop.scale(&trial))?;
                        if e < pop.energies[candidate] {
                            pop.members[candidate] = trial;
                            pop.energies[candidate] = e;
                            if e < pop.energies[0] {
                                pop.promote_best();
                            }
                        }
                    }
                }
                Updating::Deferred => {
                    let trials = (0..size)
                        .map(|candidate| self.trial(rng, &pop, candidate, scale))
                        .collect::<Vec<_>>();
                    for (candidate, trial) in trials.into_iter().enumerate() {
                        let e = objective.call(&pop.scale(&trial))?;
                        if e < pop.energies[candidate] {
                            pop.members[candidate] = trial;
                            pop.energies[candidate] = e;
                        }
                    }
                    pop.promote_best();
                }
            }
            tracing::debug!(
                generation = *nit,
                best = pop.energies[0],
                nfev = objective.nfev(),
                "differential evolution step"
            );
            if pop.converged(self.tol, self.atol) {
                status = Status::Converged;
                break;
            }
        }

        Ok(OptimizeResult {
            x: pop.scale(&pop.members[0]),
            fun: pop.energies[0],
            nit: *nit,
            nfev: objective.nfev(),
            status,
        })
    }

    fn draw_scale(&self, rng: &mut StdRng) -> f64 {
        let (lo, hi) = self.mutation;
        if hi > lo {
            rng.gen_range(lo..hi)
        } else {
            lo
        }
    }

    /// Builds a `best1bin` trial vector for the given candidate.
    fn trial(&self, rng: &mut StdRng, pop: &Population, candidate: usize, scale: f64) -> Vec<f64> {
        let size = pop.members.len();
        let n = pop.bounds.len();
        let (r0, r1) = loop {
            let r0 = rng.gen_range(0..size);
            let r1 = rng.gen_range(0..size);
            if r0 != r1 && r0 != candidate && r1 != candidate {
                break (r0, r1);
            }
        };

        let best = &pop.members[0];
        let mut trial = pop.members[candidate].clone();
        let fill_point = rng.gen_range(0..n);
        for j in 0..n {
            if j == fill_point || rng.gen::<f64>() < self.recombination {
                trial[j] = best[j] + scale * (pop.members[r0][j] - pop.members[r1][j]);
            }
        }
        for v in trial.iter_mut() {
            if !(0. ..=1.).contains(&*v) {
                *v = rng.gen();
            }
        }
        trial
    }
}

/// Stratified samples of the unit cube: each parameter has exactly one
/// sample in each of `size` equal-width slices.
fn latin_hypercube(rng: &mut StdRng, size: usize, n: usize) -> Vec<Vec<f64>> {
    let segment = 1. / size as f64;
    let mut members = vec![vec![0.; n]; size];
    let mut order = (0..size).collect::<Vec<_>>();
    for j in 0..n {
        order.shuffle(rng);
        for (i, &slot) in order.iter().enumerate() {
            members[i][j] = (slot as f64 + rng.gen::<f64>()) * segment;
        }
    }
    members
}
