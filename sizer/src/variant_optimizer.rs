//! Per-target variant optimization.
//!
//! Each target names a test and the metric values that test should produce.
//! Targets are optimized one at a time with differential evolution, using
//! the [`AdditivePenalty`] cost over that test's metrics. Candidates reuse a
//! single variant folder, `{type}_Optimization`, with short code `OPT`.

use std::fs;
use std::path::{Path, PathBuf};

use arcstr::ArcStr;
use indexmap::IndexMap;
use optim::{DifferentialEvolution, Lbfgsb};
use serde::{Deserialize, Serialize};

use crate::config::{write_json, ComponentParams, ParameterBound, Tests};
use crate::error::Result;
use crate::evaluate::{Evaluate, TestResult};
use crate::params::round_to;
use crate::score::AdditivePenalty;
use crate::variant::VariantSpec;

/// Name of the reused optimization variant.
pub const OPTIMIZATION_VARIANT: &str = "Optimization";
/// Short code of the reused optimization variant.
pub const OPTIMIZATION_SHORT: &str = "OPT";

/// Name of the file receiving per-target optimization results.
pub const OPTIMIZATION_RESULTS: &str = "optimization_results.json";
/// Name of the file receiving variant comparison results.
pub const COMPARISON_RESULTS: &str = "comparison_results.json";

/// Parameter ranges keyed by component name, then parameter name.
pub type ParamRanges = IndexMap<ArcStr, IndexMap<ArcStr, (f64, f64)>>;

/// Target metric values keyed by test name, then metric name.
pub type Targets = IndexMap<ArcStr, IndexMap<ArcStr, f64>>;

/// Configuration of a per-target optimization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantOptimizerConfig {
    /// Characterization tests.
    pub tests: Tests,
    /// Ranges of the optimized parameters.
    pub param_ranges: ParamRanges,
    /// Parameters of the starting design.
    pub base_params: ComponentParams,
    /// Per-test metric targets.
    pub targets: Targets,
    /// Metric units, used in reports.
    pub units_map: IndexMap<ArcStr, ArcStr>,
}

impl VariantOptimizerConfig {
    /// Loads a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path, self)
    }

    /// The optimized parameters, in vector order.
    pub fn bounds(&self) -> Vec<ParameterBound> {
        self.param_ranges
            .iter()
            .flat_map(|(component, params)| {
                params.iter().map(|(parameter, &(lo, hi))| {
                    ParameterBound::new(component.clone(), parameter.clone(), lo, hi)
                })
            })
            .collect()
    }

    /// The base parameters with ranged values replaced from `x`, rounded to
    /// three decimals.
    ///
    /// Only parameters present in the base parameters are emitted.
    pub fn vector_to_params(&self, x: &[f64]) -> ComponentParams {
        let index = self
            .bounds()
            .into_iter()
            .zip(x)
            .map(|(bound, &value)| ((bound.component, bound.parameter), value))
            .collect::<IndexMap<_, _>>();
        self.base_params
            .iter()
            .map(|(component, params)| {
                let params = params
                    .iter()
                    .map(|(name, base)| {
                        let value = index
                            .get(&(component.clone(), name.clone()))
                            .map_or_else(|| base.clone(), |&v| round_to(v, 3));
                        (name.clone(), value)
                    })
                    .collect();
                (component.clone(), params)
            })
            .collect()
    }
}

/// The best design found for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetOutcome {
    /// The best parameters.
    pub best_params: ComponentParams,
    /// The cost of the best parameters.
    pub best_cost: f64,
    /// Whether the search ended normally.
    pub success: bool,
    /// The number of generations run.
    pub iterations: usize,
}

/// A simulated variant's parameters and test results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantReport {
    /// The variant's parameters.
    pub params: ComponentParams,
    /// Results keyed by test name.
    pub results: IndexMap<ArcStr, TestResult>,
}

/// Optimizes a design separately for each target.
#[derive(Debug)]
pub struct VariantOptimizer<E> {
    config: VariantOptimizerConfig,
    evaluator: E,
    results_dir: PathBuf,
    penalty: AdditivePenalty,
    seed: Option<u64>,
    outcomes: IndexMap<ArcStr, TargetOutcome>,
    best_variants: IndexMap<ArcStr, VariantSpec>,
}

impl<E: Evaluate> VariantOptimizer<E> {
    /// Creates an optimizer writing its results to `results_dir`.
    pub fn new(config: VariantOptimizerConfig, evaluator: E, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            evaluator,
            results_dir: results_dir.into(),
            penalty: AdditivePenalty::default(),
            seed: None,
            outcomes: IndexMap::new(),
            best_variants: IndexMap::new(),
        }
    }

    /// Seeds the differential evolution searches.
    #[inline]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the cost charged per missing metric.
    #[inline]
    pub fn with_penalty(mut self, penalty: AdditivePenalty) -> Self {
        self.penalty = penalty;
        self
    }

    /// The configuration.
    #[inline]
    pub fn config(&self) -> &VariantOptimizerConfig {
        &self.config
    }

    /// The evaluator.
    #[inline]
    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Optimization outcomes keyed by target name.
    #[inline]
    pub fn outcomes(&self) -> &IndexMap<ArcStr, TargetOutcome> {
        &self.outcomes
    }

    /// The best variant for each optimized target.
    #[inline]
    pub fn best_variants(&self) -> &IndexMap<ArcStr, VariantSpec> {
        &self.best_variants
    }

    /// The cost of the design `x`.
    ///
    /// With a target, only that target's test contributes; otherwise the
    /// costs of all targets are summed.
    pub fn cost(&mut self, x: &[f64], target: Option<&str>) -> f64 {
        let spec = VariantSpec::new(OPTIMIZATION_SHORT, self.config.vector_to_params(x));
        let results = match self.evaluator.evaluate(OPTIMIZATION_VARIANT, &spec) {
            Ok(evaluation) => evaluation.results,
            Err(err) => {
                tracing::warn!(%err, "evaluation failed");
                IndexMap::new()
            }
        };

        let penalty = self.penalty;
        let target_cost = |name: &str, metrics: &IndexMap<ArcStr, f64>| {
            let result = results.get(name);
            penalty.cost(
                metrics.iter().map(|(m, &v)| (m.as_str(), v)),
                |metric| result.and_then(|r| r.metric(metric)),
            )
        };
        let cost = match target {
            Some(name) => self
                .config
                .targets
                .get(name)
                .map_or(0., |metrics| target_cost(name, metrics)),
            None => self
                .config
                .targets
                .iter()
                .map(|(name, metrics)| target_cost(name, metrics))
                .sum(),
        };
        tracing::info!(test = target.unwrap_or("all"), cost, "evaluated candidate");
        cost
    }

    /// Optimizes every target in turn and saves the outcomes.
    ///
    /// Returns the best variant for each target, with short code `OPT_` and
    /// the first two letters of the target name.
    pub fn optimize(
        &mut self,
        max_iterations: usize,
        population_size: usize,
    ) -> Result<&IndexMap<ArcStr, VariantSpec>> {
        let bounds = self
            .config
            .bounds()
            .iter()
            .map(|b| (b.min_value, b.max_value))
            .collect::<Vec<_>>();
        let de = DifferentialEvolution {
            maxiter: max_iterations,
            popsize: population_size,
            tol: 0.01,
            mutation: (0.5, 1.),
            recombination: 0.7,
            seed: self.seed,
            polish: Some(Lbfgsb {
                maxiter: max_iterations,
                ..Default::default()
            }),
            ..Default::default()
        };

        let names = self.config.targets.keys().cloned().collect::<Vec<_>>();
        for name in names {
            tracing::info!(test = %name, "optimizing for target");
            let result = de.minimize(|x| self.cost(x, Some(name.as_str())), &bounds)?;
            let best_params = self.config.vector_to_params(&result.x);
            tracing::info!(test = %name, cost = result.fun, message = %result.message(), "target optimized");

            let short = format!(
                "{OPTIMIZATION_SHORT}_{}",
                name.chars().take(2).collect::<String>().to_uppercase()
            );
            self.best_variants
                .insert(name.clone(), VariantSpec::new(short, best_params.clone()));
            self.outcomes.insert(
                name,
                TargetOutcome {
                    best_params,
                    best_cost: result.fun,
                    success: result.success(),
                    iterations: result.nit,
                },
            );
        }

        self.save_outcomes()?;
        Ok(&self.best_variants)
    }

    /// Writes the optimization outcomes to `optimization_results.json`.
    pub fn save_outcomes(&self) -> Result<PathBuf> {
        let path = self.results_dir.join(OPTIMIZATION_RESULTS);
        write_json(&path, &self.outcomes)?;
        Ok(path)
    }

    /// Generates and simulates the best variant of every optimized target.
    pub fn create_and_simulate_best_variants(&mut self) -> Result<IndexMap<ArcStr, VariantReport>> {
        let variants = self.best_variants.clone();
        self.simulate_all(&variants)
    }

    /// Interpolates between the best designs of pairs of targets.
    ///
    /// For each pair, `count` variants are produced at weights
    /// `j / (count + 1)` toward the second target. Targets without an outcome
    /// contribute the base parameters. Non-numeric values keep the first
    /// target's value.
    pub fn create_pareto_variants(
        &self,
        pairs: &[(ArcStr, ArcStr)],
        count: usize,
    ) -> IndexMap<ArcStr, VariantSpec> {
        let best_params = |target: &ArcStr| {
            self.outcomes
                .get(target)
                .map_or(&self.config.base_params, |outcome| &outcome.best_params)
        };

        let mut variants = IndexMap::new();
        for (i, (first, second)) in pairs.iter().enumerate() {
            let params1 = best_params(first);
            let params2 = best_params(second);
            for j in 1..=count {
                let weight = j as f64 / (count + 1) as f64;
                let params = params1
                    .iter()
                    .map(|(component, p1)| {
                        let combined = match params2.get(component) {
                            Some(p2) => p1
                                .iter()
                                .map(|(name, v1)| {
                                    let value = p2
                                        .get(name)
                                        .and_then(|v2| interpolate(v1, v2, weight))
                                        .unwrap_or_else(|| v1.clone());
                                    (name.clone(), value)
                                })
                                .collect(),
                            None => p1.clone(),
                        };
                        (component.clone(), combined)
                    })
                    .collect();
                variants.insert(
                    arcstr::format!("Pareto_{first}_{second}_{j}"),
                    VariantSpec::new(arcstr::format!("P{i}{j}"), params),
                );
            }
        }
        variants
    }

    /// Simulates `variants` and writes the results to `comparison_results.json`.
    pub fn compare_variants(
        &mut self,
        variants: &IndexMap<ArcStr, VariantSpec>,
    ) -> Result<IndexMap<ArcStr, VariantReport>> {
        let reports = self.simulate_all(variants)?;
        write_json(self.results_dir.join(COMPARISON_RESULTS), &reports)?;
        Ok(reports)
    }

    fn simulate_all(
        &mut self,
        variants: &IndexMap<ArcStr, VariantSpec>,
    ) -> Result<IndexMap<ArcStr, VariantReport>> {
        let mut reports = IndexMap::new();
        for (name, spec) in variants {
            let evaluation = self.evaluator.evaluate(name, spec)?;
            reports.insert(
                name.clone(),
                VariantReport {
                    params: spec.params.clone(),
                    results: evaluation.results,
                },
            );
        }
        Ok(reports)
    }
}

fn interpolate(a: &str, b: &str, weight: f64) -> Option<ArcStr> {
    let a = a.trim().parse::<f64>().ok()?;
    let b = b.trim().parse::<f64>().ok()?;
    Some(round_to(a * (1. - weight) + b * weight, 3))
}
