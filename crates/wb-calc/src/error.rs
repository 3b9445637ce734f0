//! Error types for balance calculation.

use thiserror::Error;
use wb_core::WbError;
use wb_results::ResultsError;
use wb_topology::TopologyError;

/// Fatal calculation failures. Degraded inputs never end up here; they
/// become quality flags on the result.
#[derive(Error, Debug)]
pub enum CalcError {
    #[error("Topology unavailable: {what}")]
    TopologyUnavailable { what: String },

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Invalid constant {name} = {value}: {reason}")]
    InvalidConstant {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("Topology breaks {count} house rule(s), first: {first}")]
    PolicyViolation { count: usize, first: String },

    #[error("Storage history error: {0}")]
    History(#[from] ResultsError),

    #[error("{0}")]
    Core(#[from] WbError),
}

pub type CalcResult<T> = Result<T, CalcError>;
