//! Sizer errors.

use std::path::PathBuf;

use arcstr::ArcStr;
use thiserror::Error as ThisError;

/// The result type returned by sizer functions.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible sizer errors.
#[derive(ThisError, Debug)]
pub enum Error {
    /// Error reading, writing, or querying a schematic.
    #[error("schematic error: {0}")]
    Schematic(#[from] xschem::Error),
    /// Error netlisting or simulating a testbench.
    #[error("simulation error: {0}")]
    Simulation(#[from] ngspice::Error),
    /// Invalid minimizer input.
    #[error("optimizer error: {0}")]
    Optimizer(#[from] optim::Error),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// TOML deserialization error.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Template parsing/rendering error.
    #[error("template error")]
    Template(#[from] tera::Error),
    /// A template schematic or symbol does not exist.
    #[error("template not found: {0:?}")]
    TemplateNotFound(PathBuf),
    /// A configuration file has an extension other than `.json` or `.toml`.
    #[error("unsupported configuration format: {0:?}")]
    UnsupportedConfigFormat(PathBuf),
    /// A bounded parameter has no initial value.
    #[error("no initial value for parameter `{parameter}` of component `{component}`")]
    MissingParameter {
        /// The component name.
        component: ArcStr,
        /// The parameter name.
        parameter: ArcStr,
    },
    /// A bounded parameter's initial value is not a number.
    #[error("value `{value}` of parameter `{parameter}` of component `{component}` is not a number")]
    InvalidParameter {
        /// The component name.
        component: ArcStr,
        /// The parameter name.
        parameter: ArcStr,
        /// The offending value.
        value: ArcStr,
    },
}
