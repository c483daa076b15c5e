//! Circuit sizing configuration.
//!
//! Configurations are read from JSON or TOML and written back as JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arcstr::ArcStr;
use indexmap::IndexMap;
use ngspice::SimulatorOpts;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rules::DesignRules;

/// Parameter values keyed by component name, then parameter name.
pub type ComponentParams = IndexMap<ArcStr, IndexMap<ArcStr, ArcStr>>;

/// Test specifications keyed by test name.
pub type Tests = IndexMap<ArcStr, TestSpec>;

/// The stimulus and simulation control text for one characterization test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
    /// Simulation control text placed in the testbench's code block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spice: Option<ArcStr>,
    /// Source drive values keyed by source name.
    ///
    /// Each source name is mapped to a testbench component name using a
    /// [`SourceNaming`] convention.
    #[serde(flatten)]
    pub sources: IndexMap<ArcStr, ArcStr>,
}

/// How a target's score responds to the measured value.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    /// The measured value should be at least the target.
    #[default]
    Min,
    /// The measured value should be at most the target.
    Max,
    /// The measured value should equal the target.
    Exact,
}

/// A desired value for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// The metric name, as printed by the simulator.
    pub metric: ArcStr,
    /// The target value.
    pub target_value: f64,
    /// The target's weight in the aggregate score.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// How the measured value is compared against the target.
    #[serde(default)]
    pub constraint_type: ConstraintType,
    /// The metric's unit, used in reports.
    #[serde(default, alias = "UNIT", skip_serializing_if = "Option::is_none")]
    pub unit: Option<ArcStr>,
}

impl TargetConfig {
    /// Creates a target with unit weight and no unit.
    pub fn new(
        metric: impl Into<ArcStr>,
        target_value: f64,
        constraint_type: ConstraintType,
    ) -> Self {
        Self {
            metric: metric.into(),
            target_value,
            weight: 1.,
            constraint_type,
            unit: None,
        }
    }

    /// Sets the target's weight.
    #[inline]
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// The range of one scalar design variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBound {
    /// The component name.
    pub component: ArcStr,
    /// The parameter name.
    pub parameter: ArcStr,
    /// Lower bound.
    pub min_value: f64,
    /// Upper bound.
    pub max_value: f64,
}

impl ParameterBound {
    /// Creates a new parameter bound.
    pub fn new(
        component: impl Into<ArcStr>,
        parameter: impl Into<ArcStr>,
        min_value: f64,
        max_value: f64,
    ) -> Self {
        Self {
            component: component.into(),
            parameter: parameter.into(),
            min_value,
            max_value,
        }
    }

    /// The width of the range.
    #[inline]
    pub fn range(&self) -> f64 {
        self.max_value - self.min_value
    }
}

/// Maps a test's source names to testbench component names.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceNaming {
    /// `v1_common_mode` drives `V1`.
    #[default]
    PrefixBeforeFirstUnderscore,
    /// `common_mode_v1` drives `V1`.
    SuffixAfterLastUnderscore,
}

impl SourceNaming {
    /// The component name driven by `source`, upper-cased.
    ///
    /// A source name without an underscore maps to itself.
    pub fn component_name(&self, source: &str) -> String {
        let part = match self {
            Self::PrefixBeforeFirstUnderscore => source.split_once('_').map_or(source, |(p, _)| p),
            Self::SuffixAfterLastUnderscore => source.rsplit_once('_').map_or(source, |(_, s)| s),
        };
        part.to_uppercase()
    }
}

/// External tools used for simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// The xschem executable.
    pub xschem: PathBuf,
    /// The ngspice executable.
    pub ngspice: PathBuf,
    /// Per-tool time limit in seconds.
    pub timeout_secs: u64,
    /// Number of testbenches simulated concurrently.
    pub workers: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let opts = SimulatorOpts::default();
        Self {
            xschem: opts.xschem,
            ngspice: opts.ngspice,
            timeout_secs: opts.timeout.as_secs(),
            workers: opts.workers,
        }
    }
}

/// Everything needed to size one circuit type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// The circuit type, e.g. `OpAmp`. Template files are named after it.
    pub circuit_type: ArcStr,
    /// Directory holding `{type}.sch`, `{type}.sym`, and `{type}_tb.sch`.
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,
    /// Directory receiving generated variant folders.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Directory receiving netlists and simulator scratch files.
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    /// Starting parameter values.
    pub initial_params: ComponentParams,
    /// Characterization tests run on every variant.
    pub tests: Tests,
    /// Optimization targets.
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    /// Design variables, in optimization vector order.
    #[serde(default)]
    pub bounds: Vec<ParameterBound>,
    /// Iteration budget for each search strategy.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Score at which the search stops.
    #[serde(default = "default_target_precision")]
    pub target_precision: f64,
    /// Simulation tool settings.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Process design rules applied to every candidate.
    #[serde(default)]
    pub design_rules: DesignRules,
    /// Source name to component name convention.
    #[serde(default)]
    pub source_naming: SourceNaming,
}

fn default_weight() -> f64 {
    1.
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("template")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_build_dir() -> PathBuf {
    SimulatorOpts::default().build_dir
}

fn default_max_iterations() -> usize {
    20
}

fn default_target_precision() -> f64 {
    0.95
}

impl CircuitConfig {
    /// Loads a configuration from a `.json` or `.toml` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let data = fs::read_to_string(path)?;
        let config = match format {
            ConfigFormat::Json => serde_json::from_str(&data)?,
            ConfigFormat::Toml => toml::from_str(&data)?,
        };
        tracing::debug!(?path, "loaded circuit configuration");
        Ok(config)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path, self)
    }

    /// Metric units keyed by metric name, for targets that declare one.
    pub fn units(&self) -> IndexMap<ArcStr, ArcStr> {
        self.targets
            .iter()
            .filter_map(|t| Some((t.metric.clone(), t.unit.clone()?)))
            .collect()
    }

    /// Simulation runner options derived from this configuration.
    pub fn simulator_opts(&self) -> SimulatorOpts {
        SimulatorOpts {
            build_dir: self.build_dir.clone(),
            xschem: self.simulation.xschem.clone(),
            ngspice: self.simulation.ngspice.clone(),
            timeout: Duration::from_secs(self.simulation.timeout_secs),
            workers: self.simulation.workers,
        }
    }
}

enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            _ => Err(Error::UnsupportedConfigFormat(path.to_path_buf())),
        }
    }
}

/// Writes `value` to `path` as pretty-printed JSON, creating parent directories.
pub(crate) fn write_json(path: impl AsRef<Path>, value: &impl Serialize) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(value)?;
    fs::write(path, data)?;
    Ok(())
}
