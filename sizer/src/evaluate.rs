//! Evaluation of variants by simulation.

use std::collections::HashMap;
use std::path::PathBuf;

use arcstr::ArcStr;
use indexmap::IndexMap;
use ngspice::{SimOutput, Simulator};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::config::{CircuitConfig, Tests};
use crate::error::Result;
use crate::report::write_readme;
use crate::score::find_in_output;
use crate::variant::{remove_folder, VariantGenerator, VariantSpec};

/// The outcome of one characterization test.
#[derive(Debug, Clone, PartialEq)]
pub enum TestResult {
    /// The simulation ran and printed metrics.
    Completed(SimOutput),
    /// The simulation exceeded its time limit.
    TimedOut,
    /// The test could not be netlisted or simulated, or printed no metrics.
    Failed {
        /// A description of the failure.
        error: ArcStr,
        /// The simulator output, if any was captured.
        stdout: Option<ArcStr>,
    },
}

impl TestResult {
    /// An extracted metric value.
    pub fn metric(&self, name: &str) -> Option<f64> {
        match self {
            Self::Completed(output) => output.metrics.get(name).copied(),
            _ => None,
        }
    }

    /// The captured simulator output.
    pub fn stdout(&self) -> Option<&ArcStr> {
        match self {
            Self::Completed(output) => Some(&output.stdout),
            Self::Failed { stdout, .. } => stdout.as_ref(),
            Self::TimedOut => None,
        }
    }

    /// An extracted metric value, falling back to searching the raw output.
    pub fn find_metric(&self, name: &str) -> Option<f64> {
        self.metric(name)
            .or_else(|| find_in_output(self.stdout()?, name))
    }

    /// Returns `true` if the simulation timed out.
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

impl From<ngspice::Result<SimOutput>> for TestResult {
    fn from(value: ngspice::Result<SimOutput>) -> Self {
        match value {
            Ok(output) => Self::Completed(output),
            Err(err) if err.is_timeout() => Self::TimedOut,
            Err(err) => Self::Failed {
                error: arcstr::format!("{err}"),
                stdout: err.stdout().cloned(),
            },
        }
    }
}

impl Serialize for TestResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Completed(output) => {
                let mut map = serializer.serialize_map(Some(output.metrics.len() + 1))?;
                for (metric, value) in &output.metrics {
                    map.serialize_entry(metric, value)?;
                }
                map.serialize_entry("stdout", &output.stdout)?;
                map.end()
            }
            Self::TimedOut => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", "timed out")?;
                map.end()
            }
            Self::Failed { error, stdout } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("error", error)?;
                if let Some(stdout) = stdout {
                    map.serialize_entry("stdout", stdout)?;
                }
                map.end()
            }
        }
    }
}

/// The test results of one generated variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// The variant's folder.
    #[serde(skip)]
    pub folder: PathBuf,
    /// Results keyed by test name, in test order.
    #[serde(flatten)]
    pub results: IndexMap<ArcStr, TestResult>,
}

impl Evaluation {
    /// The first value of `metric` found across all tests.
    ///
    /// Each test's extracted metrics are checked before its raw output.
    pub fn find_metric(&self, metric: &str) -> Option<f64> {
        self.results
            .values()
            .find_map(|result| result.find_metric(metric))
    }

    /// Returns `true` if any test timed out.
    pub fn timed_out(&self) -> bool {
        self.results.values().any(TestResult::is_timeout)
    }
}

/// Materializes and characterizes variants.
pub trait Evaluate {
    /// Generates the variant `name` and runs all of its tests.
    fn evaluate(&mut self, name: &str, variant: &VariantSpec) -> Result<Evaluation>;
}

impl<E: Evaluate + ?Sized> Evaluate for &mut E {
    fn evaluate(&mut self, name: &str, variant: &VariantSpec) -> Result<Evaluation> {
        (**self).evaluate(name, variant)
    }
}

/// Evaluates variants by generating them on disk and simulating every test.
///
/// A `README.md` summarizing parameters and results is written into each
/// variant folder.
#[derive(Debug, Clone)]
pub struct SimulatedEvaluator {
    generator: VariantGenerator,
    simulator: Simulator,
    tests: Tests,
    units: IndexMap<ArcStr, ArcStr>,
}

impl SimulatedEvaluator {
    /// Creates an evaluator running `tests` on every variant.
    pub fn new(generator: VariantGenerator, simulator: Simulator, tests: Tests) -> Self {
        Self {
            generator,
            simulator,
            tests,
            units: IndexMap::new(),
        }
    }

    /// Creates an evaluator from a circuit configuration.
    pub fn from_config(config: &CircuitConfig) -> Self {
        Self::new(
            VariantGenerator::from_config(config),
            Simulator::new(config.simulator_opts()),
            config.tests.clone(),
        )
        .with_units(config.units())
    }

    /// Sets the metric units used in reports.
    pub fn with_units(mut self, units: IndexMap<ArcStr, ArcStr>) -> Self {
        self.units = units;
        self
    }

    /// The tests run on every variant.
    #[inline]
    pub fn tests(&self) -> &Tests {
        &self.tests
    }

    /// The variant generator.
    #[inline]
    pub fn generator(&self) -> &VariantGenerator {
        &self.generator
    }
}

impl Evaluate for SimulatedEvaluator {
    fn evaluate(&mut self, name: &str, variant: &VariantSpec) -> Result<Evaluation> {
        let generated = self.generator.create_variant(name, variant, &self.tests)?;
        let testbenches = generated.testbenches.values().cloned().collect::<Vec<_>>();

        let mut completed = self
            .simulator
            .run_batch::<&str>(&testbenches, &[])
            .into_iter()
            .map(|(tb, result)| (tb, TestResult::from(result)))
            .collect::<HashMap<_, _>>();
        let results = generated
            .testbenches
            .iter()
            .map(|(test, tb)| {
                let result = completed.remove(tb).unwrap_or_else(|| TestResult::Failed {
                    error: arcstr::literal!("no simulation result"),
                    stdout: None,
                });
                (test.clone(), result)
            })
            .collect::<IndexMap<_, _>>();

        if let Err(err) = write_readme(
            &generated.folder,
            name,
            self.generator.circuit_type(),
            variant,
            &results,
            &self.units,
        ) {
            remove_folder(&generated.folder);
            return Err(err);
        }
        tracing::info!(name, short = %variant.short, tests = results.len(), "simulated variant");

        Ok(Evaluation {
            folder: generated.folder,
            results,
        })
    }
}
