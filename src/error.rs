//! Error taxonomy for ledger loading and the RFM pipeline

use polars::prelude::PolarsError;
use thiserror::Error;

/// Failures raised by the loader and the core computations.
///
/// Computations never return partial results: when one of these is raised
/// the whole call fails and the caller keeps whatever it displayed before.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RfmError {
    #[error("invalid date '{value}': expected YYYY-MM-DD")]
    InvalidDate { value: String },
    #[error("unknown aggregation mode '{0}'")]
    UnknownMode(String),
    #[error("row {row}: cannot parse purchase timestamp '{value}'")]
    MalformedTimestamp { row: usize, value: String },
    #[error("row {row}: column '{column}' has invalid amount '{value}'")]
    InvalidAmount {
        row: usize,
        column: &'static str,
        value: String,
    },
    #[error("row {row}: required column '{column}' is empty")]
    MissingValue { row: usize, column: &'static str },
    #[error("customer '{customer_id}' is missing from the {rollup} rollup")]
    JoinMismatch {
        customer_id: String,
        rollup: &'static str,
    },
    #[error("frame computation failed: {0}")]
    Frame(String),
}

// PolarsError is neither Clone nor PartialEq, so only its message is kept
impl From<PolarsError> for RfmError {
    fn from(err: PolarsError) -> Self {
        RfmError::Frame(err.to_string())
    }
}
