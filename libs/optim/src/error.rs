use thiserror::Error;

/// The result type returned by minimizers.
pub type Result<T> = std::result::Result<T, Error>;

/// An error in the problem given to a minimizer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// No parameters were given.
    #[error("at least one bounded parameter is required")]
    EmptyBounds,
    /// A bound pair was not finite or had its lower end above its upper end.
    #[error("invalid bounds for parameter {index}: [{lo}, {hi}]")]
    InvalidBounds {
        /// Index of the offending parameter.
        index: usize,
        /// Lower bound.
        lo: f64,
        /// Upper bound.
        hi: f64,
    },
    /// The starting point does not have one entry per bound.
    #[error("starting point has {found} entries but there are {expected} bounds")]
    DimensionMismatch {
        /// The number of bounds.
        expected: usize,
        /// The length of the starting point.
        found: usize,
    },
}
