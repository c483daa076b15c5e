//! Simulation runner errors.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use arcstr::ArcStr;
use thiserror::Error as ThisError;

/// The result type returned by simulation runner functions.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible simulation runner errors.
#[derive(ThisError, Debug)]
pub enum Error {
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Template parsing/rendering error.
    #[error("template error")]
    Template(#[from] tera::Error),
    /// The netlister did not produce a netlist.
    #[error("failed to netlist `{testbench:?}` (exit status {status:?})")]
    Netlist {
        /// The testbench schematic.
        testbench: PathBuf,
        /// The netlister's exit status, if it ran to completion.
        status: Option<ExitStatus>,
    },
    /// An external tool exceeded its time limit and was killed.
    #[error("simulation timed out after {} seconds", .0.as_secs_f64())]
    Timeout(Duration),
    /// The simulator output contained no metric lines.
    #[error("no metrics found")]
    NoMetrics {
        /// The full simulator output.
        stdout: ArcStr,
    },
}

impl Error {
    /// Returns `true` if this error is a timeout.
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// The captured simulator output, if this error carries it.
    pub fn stdout(&self) -> Option<&ArcStr> {
        match self {
            Self::NoMetrics { stdout } => Some(stdout),
            _ => None,
        }
    }
}
