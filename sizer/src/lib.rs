//! Automated sizing of analog circuits described by xschem templates.
//!
//! Parameter sets are materialized as variants of a template schematic,
//! characterized with ngspice, and scored against performance targets.
#![warn(missing_docs)]

pub mod characterize;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod optimizer;
pub mod params;
pub mod report;
pub mod rules;
pub mod score;
pub mod variant;
pub mod variant_optimizer;


pub use characterize::build_and_simulate_variants;
pub use config::{CircuitConfig, ComponentParams, ParameterBound, TargetConfig, TestSpec};
pub use error::{Error, Result};
pub use evaluate::{Evaluate, Evaluation, SimulatedEvaluator, TestResult};
pub use optimizer::{CircuitOptimizer, Optimized, Termination};
pub use rules::DesignRules;
pub use variant::{VariantGenerator, VariantSpec};
pub use variant_optimizer::{VariantOptimizer, VariantOptimizerConfig};
