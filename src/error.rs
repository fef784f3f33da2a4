//! Error types shared by the clustering routines.

use thiserror::Error;

/// Errors reported before a clustering run starts.
///
/// Every variant describes a configuration or input problem. Hitting the
/// iteration cap is a normal termination and never shows up here.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// No points were supplied.
    #[error("cannot cluster an empty point set")]
    EmptyInput,

    /// `k` is zero or larger than the number of points.
    #[error("invalid number of clusters k = {k} for {n} points (need 1 <= k <= {n})")]
    InvalidClusterCount { k: usize, n: usize },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A point carries a NaN or infinite coordinate.
    #[error("point {index} has a non-finite coordinate")]
    NonFinitePoint { index: usize },
}

/// Result type for clustering operations.
pub type Result<T> = std::result::Result<T, Error>;
