//! Scoring of simulation results against targets.
//!
//! Two strategies treat missing measurements differently.
//! [`WeightedMean`] drops a target without a measurement from the average,
//! while [`AdditivePenalty`] charges a fixed cost for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

use crate::config::{ConstraintType, TargetConfig};

const NUMBER: &str = r"([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)";

/// The score of one measured value against one target, in `[0, 1]`.
///
/// Ratios involving a non-positive divisor score 0.
pub fn target_score(target: &TargetConfig, value: f64) -> f64 {
    let t = target.target_value;
    let score = match target.constraint_type {
        ConstraintType::Min => {
            if t > 0. {
                (value / t).min(1.)
            } else {
                0.
            }
        }
        ConstraintType::Max => {
            if value > 0. {
                (t / value).min(1.)
            } else {
                0.
            }
        }
        ConstraintType::Exact => {
            if t == 0. {
                if value == 0. {
                    1.
                } else {
                    0.
                }
            } else {
                1. - ((value - t) / t).abs()
            }
        }
    };
    if score.is_nan() {
        0.
    } else {
        score.clamp(0., 1.)
    }
}

/// Weighted mean of per-target scores over the targets that were measured.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct WeightedMean;

impl WeightedMean {
    /// Scores the measurements returned by `lookup`; higher is better.
    ///
    /// Scores 0 if no target was measured.
    pub fn score<F>(&self, targets: &[TargetConfig], mut lookup: F) -> f64
    where
        F: FnMut(&str) -> Option<f64>,
    {
        let mut total = 0.;
        let mut weight = 0.;
        for target in targets {
            match lookup(&target.metric) {
                Some(value) => {
                    total += target_score(target, value) * target.weight;
                    weight += target.weight;
                }
                None => tracing::debug!(metric = %target.metric, "metric not measured"),
            }
        }
        if weight > 0. {
            total / weight
        } else {
            0.
        }
    }
}

/// Sum of relative errors, in percent, plus a fixed penalty per missing metric.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AdditivePenalty {
    /// Cost of a target without a measurement.
    pub penalty: f64,
}

impl Default for AdditivePenalty {
    fn default() -> Self {
        Self { penalty: 1000. }
    }
}

impl AdditivePenalty {
    /// The cost of the measurements returned by `lookup`; lower is better.
    ///
    /// A zero target contributes its absolute error in percent.
    pub fn cost<'a, I, F>(&self, targets: I, mut lookup: F) -> f64
    where
        I: IntoIterator<Item = (&'a str, f64)>,
        F: FnMut(&str) -> Option<f64>,
    {
        targets
            .into_iter()
            .map(|(metric, target)| match lookup(metric) {
                Some(measured) => {
                    let err = if target == 0. {
                        measured.abs()
                    } else {
                        ((measured - target) / target).abs()
                    };
                    tracing::debug!(metric, target_value = target, measured, error = err * 100., "metric error");
                    err * 100.
                }
                None => {
                    tracing::debug!(metric, penalty = self.penalty, "missing metric");
                    self.penalty
                }
            })
            .sum()
    }
}

lazy_static! {
    static ref METRIC_PATTERNS: Mutex<HashMap<String, Arc<MetricPatterns>>> =
        Mutex::new(HashMap::new());
}

/// Compiled fallback patterns for one metric name.
///
/// Matching is case-insensitive. The forms tried, in order, are
/// `NAME: value`, `echo 'NAME:' $&value`, and `NAME = value`.
#[derive(Debug, Clone)]
pub struct MetricPatterns {
    patterns: Vec<Regex>,
}

impl MetricPatterns {
    /// Compiles the patterns for `metric`.
    pub fn new(metric: &str) -> Self {
        let name = regex::escape(metric);
        let patterns = [
            format!(r"{name}:\s*{NUMBER}"),
            format!(r"echo\s+'{name}:'\s+\$&([^\s]+)"),
            format!(r"{name}\s*=\s*{NUMBER}"),
        ]
        .iter()
        .filter_map(|pattern| {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => Some(re),
                Err(err) => {
                    tracing::warn!(%err, %pattern, "invalid metric pattern");
                    None
                }
            }
        })
        .collect();
        Self { patterns }
    }

    /// The first value found in `stdout`, trying each pattern in order.
    pub fn find(&self, stdout: &str) -> Option<f64> {
        // The echo form captures an unvalidated token.
        self.patterns
            .iter()
            .find_map(|re| re.captures(stdout).and_then(|caps| caps[1].parse::<f64>().ok()))
    }
}

/// Searches raw simulator output for a metric the extractor did not pick up.
///
/// Patterns are compiled once per metric name and reused afterwards.
pub fn find_in_output(stdout: &str, metric: &str) -> Option<f64> {
    let patterns = {
        let mut cache = METRIC_PATTERNS
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cache
            .entry(metric.to_string())
            .or_insert_with(|| Arc::new(MetricPatterns::new(metric)))
            .clone()
    };
    patterns.find(stdout)
}
