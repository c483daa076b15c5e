//! Weighted-score circuit optimization.
//!
//! Every candidate is snapped to the process design rules, materialized as a
//! variant, simulated, and scored with [`WeightedMean`]. A global differential
//! evolution search runs first; a bounded quasi-Newton search from the initial
//! point follows unless the first search reached the target precision or
//! stagnated.

use std::collections::VecDeque;
use std::fmt::Display;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use optim::{DifferentialEvolution, Lbfgsb, Status, Updating};
use serde::Serialize;

use crate::config::{CircuitConfig, ComponentParams, ParameterBound, TargetConfig};
use crate::error::Result;
use crate::evaluate::{Evaluate, Evaluation};
use crate::params::{params_to_vector, vector_to_params};
use crate::rules::DesignRules;
use crate::score::WeightedMean;
use crate::variant::{remove_folder, VariantSpec};

/// Number of recent scores kept for progress tracking.
const RECENT_WINDOW: usize = 5;
/// Score assigned to candidates whose evaluation failed or timed out.
pub const FAILED_SCORE: f64 = 0.1;

/// Why an optimization run ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The initial parameters already met the target precision.
    AlreadyMet,
    /// The initial parameters scored zero, so there was nothing to improve on.
    Unscorable,
    /// A candidate met the target precision.
    TargetReached,
    /// Too many evaluations passed without improvement.
    Stagnated,
    /// Every search strategy ran to completion.
    Exhausted,
}

/// The result of an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Optimized {
    /// The best parameters found, or the initial parameters if nothing beat them.
    pub params: ComponentParams,
    /// The score of `params`.
    pub score: f64,
    /// The score of the initial parameters.
    pub initial_score: f64,
    /// The number of variants evaluated, including the initial one.
    pub evaluations: usize,
    /// Why the run ended.
    pub termination: Termination,
}

#[derive(Debug, Copy, Clone)]
enum Strategy {
    Global,
    Local,
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "differential evolution"),
            Self::Local => write!(f, "L-BFGS-B"),
        }
    }
}

#[derive(Debug, Default)]
struct SearchState {
    /// Candidates proposed by the search strategies.
    candidates: usize,
    /// Calls to the evaluator.
    evaluations: usize,
    recent: VecDeque<f64>,
    best_score: f64,
    stagnation: usize,
    previous_folder: Option<PathBuf>,
}

impl SearchState {
    fn record(&mut self, score: f64) {
        self.recent.push_back(score);
        if self.recent.len() > RECENT_WINDOW {
            self.recent.pop_front();
        }
        if score > self.best_score {
            self.best_score = score;
            self.stagnation = 0;
            tracing::info!(score, "new best score");
        } else {
            self.stagnation += 1;
        }
    }
}

/// Searches bounded device parameters for the best weighted target score.
#[derive(Debug)]
pub struct CircuitOptimizer<E> {
    evaluator: E,
    targets: Vec<TargetConfig>,
    bounds: Vec<ParameterBound>,
    rules: DesignRules,
    state: SearchState,
}

impl<E: Evaluate> CircuitOptimizer<E> {
    /// Creates an optimizer with no targets or bounds.
    pub fn new(evaluator: E) -> Self {
        Self {
            evaluator,
            targets: Vec::new(),
            bounds: Vec::new(),
            rules: DesignRules::default(),
            state: SearchState::default(),
        }
    }

    /// Creates an optimizer with the targets, bounds, and design rules of `config`.
    pub fn from_config(config: &CircuitConfig, evaluator: E) -> Self {
        let mut optimizer = Self::new(evaluator).with_design_rules(config.design_rules);
        optimizer.targets = config.targets.clone();
        optimizer.bounds = config.bounds.clone();
        optimizer
    }

    /// Sets the design rules applied to candidates.
    #[inline]
    pub fn with_design_rules(mut self, rules: DesignRules) -> Self {
        self.rules = rules;
        self
    }

    /// Adds an optimization target.
    pub fn add_target(&mut self, target: TargetConfig) {
        self.targets.push(target);
    }

    /// Adds a design variable. Bounds are indexed in insertion order.
    pub fn add_bound(&mut self, bound: ParameterBound) {
        self.bounds.push(bound);
    }

    /// The optimization targets.
    #[inline]
    pub fn targets(&self) -> &[TargetConfig] {
        &self.targets
    }

    /// The design variables.
    #[inline]
    pub fn bounds(&self) -> &[ParameterBound] {
        &self.bounds
    }

    /// The evaluator.
    #[inline]
    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// The best candidate score seen in the current or last run.
    #[inline]
    pub fn best_score(&self) -> f64 {
        self.state.best_score
    }

    /// The scores of the most recent candidates, oldest first.
    pub fn recent_scores(&self) -> impl Iterator<Item = f64> + '_ {
        self.state.recent.iter().copied()
    }

    /// Scores an evaluation; timeouts score [`FAILED_SCORE`].
    pub fn score(&self, evaluation: &Evaluation) -> f64 {
        if evaluation.timed_out() {
            return FAILED_SCORE;
        }
        WeightedMean.score(&self.targets, |metric| evaluation.find_metric(metric))
    }

    /// Optimizes the bounded parameters of `initial`.
    ///
    /// Returns `initial` unchanged if it already scores at least
    /// `target_precision`, if it cannot be scored, or if no search finds
    /// a better score.
    pub fn optimize(
        &mut self,
        initial: &ComponentParams,
        max_iterations: usize,
        target_precision: f64,
    ) -> Result<Optimized> {
        self.state = SearchState::default();

        let initial_score = self.evaluate_params(initial);
        tracing::info!(initial_score, target_precision, "scored initial parameters");
        if initial_score <= 0. {
            tracing::warn!("initial parameters could not be scored");
            return Ok(self.finish(initial.clone(), initial_score, initial_score, Termination::Unscorable));
        }
        if initial_score >= target_precision {
            tracing::info!("initial parameters already meet the target precision");
            return Ok(self.finish(initial.clone(), initial_score, initial_score, Termination::AlreadyMet));
        }

        let x0 = params_to_vector(initial, &self.bounds)?;
        let bounds = self
            .bounds
            .iter()
            .map(|b| (b.min_value, b.max_value))
            .collect::<Vec<_>>();
        let eps = self
            .bounds
            .iter()
            .map(|b| (b.range() * 1e-6).max(1e-8))
            .collect();
        let local = Lbfgsb {
            maxiter: max_iterations,
            maxfun: 2 * max_iterations,
            ftol: 1e-3,
            gtol: 1e-2,
            eps,
            ..Default::default()
        };
        let global = DifferentialEvolution {
            maxiter: max_iterations,
            popsize: (2 * bounds.len()).min(8),
            tol: 1e-2,
            atol: 1e-3,
            seed: Some(42),
            updating: Updating::Deferred,
            polish: Some(local.clone()),
            ..Default::default()
        };

        let mut best = None;
        let mut best_score = initial_score;
        let mut termination = Termination::Exhausted;
        for strategy in [Strategy::Global, Strategy::Local] {
            tracing::info!(%strategy, "starting search");
            let objective = |x: &[f64]| self.objective(x, initial, target_precision);
            let result = match strategy {
                Strategy::Global => global.minimize(objective, &bounds),
                Strategy::Local => local.minimize(objective, &x0, &bounds),
            };
            let result = match result {
                Ok(result) => result,
                Err(err) => {
                    tracing::warn!(%strategy, %err, "search failed");
                    continue;
                }
            };

            let score = if result.status == Status::Stopped || !result.fun.is_finite() {
                self.state.best_score
            } else {
                -result.fun
            };
            tracing::info!(
                %strategy,
                score,
                evaluations = result.nfev,
                message = %result.message(),
                "search finished"
            );
            if score > best_score {
                best_score = score;
                best = Some(result.x);
            }
            if score >= target_precision {
                termination = Termination::TargetReached;
                break;
            }
            if self.state.stagnation > max_iterations / 2 {
                tracing::info!(stagnation = self.state.stagnation, "search stagnated");
                termination = Termination::Stagnated;
                break;
            }
        }

        let params = match best {
            Some(x) => {
                let x = self.rules.correct(&x, &self.bounds);
                vector_to_params(&x, initial, &self.bounds)
            }
            None => {
                tracing::info!("no search improved on the initial parameters");
                initial.clone()
            }
        };
        tracing::info!(score = best_score, ?termination, "optimization complete");
        Ok(self.finish(params, best_score, initial_score, termination))
    }

    fn objective(&mut self, x: &[f64], initial: &ComponentParams, target_precision: f64) -> f64 {
        let x = self.rules.correct(x, &self.bounds);
        self.state.candidates += 1;
        let params = vector_to_params(&x, initial, &self.bounds);
        for (bound, value) in self.bounds.iter().zip(&x) {
            tracing::debug!(
                component = %bound.component,
                parameter = %bound.parameter,
                value,
                "candidate parameter"
            );
        }

        let score = self.evaluate_params(&params);
        tracing::info!(candidate = self.state.candidates, score, "evaluated candidate");
        self.state.record(score);

        if score >= target_precision {
            tracing::info!(score, target_precision, "target precision reached");
            return f64::NEG_INFINITY;
        }
        -score
    }

    /// Generates, simulates, and scores one parameter set.
    ///
    /// The variant generated by the previous call is deleted first.
    fn evaluate_params(&mut self, params: &ComponentParams) -> f64 {
        self.discard_previous();
        self.state.evaluations += 1;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() % 100_000)
            .unwrap_or_default();
        let name = format!("opt_{millis}_{}", self.state.candidates);
        let spec = VariantSpec::new(name.as_str(), params.clone());

        match self.evaluator.evaluate(&name, &spec) {
            Ok(evaluation) => {
                let score = self.score(&evaluation);
                self.state.previous_folder = Some(evaluation.folder);
                score
            }
            Err(err) => {
                tracing::warn!(%err, "evaluation failed");
                FAILED_SCORE
            }
        }
    }

    fn discard_previous(&mut self) {
        if let Some(folder) = self.state.previous_folder.take() {
            remove_folder(&folder);
        }
    }

    fn finish(
        &mut self,
        params: ComponentParams,
        score: f64,
        initial_score: f64,
        termination: Termination,
    ) -> Optimized {
        self.discard_previous();
        Optimized {
            params,
            score,
            initial_score,
            evaluations: self.state.evaluations,
            termination,
        }
    }
}
