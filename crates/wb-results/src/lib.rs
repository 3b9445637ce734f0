//! wb-results: storage history persistence and input hashing.

pub mod hash;
pub mod store;
pub mod types;

pub use hash::compute_input_hash;
pub use store::{InMemoryHistory, JsonHistoryStore, StorageHistoryStore};
pub use types::*;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid history record for '{facility_code}': {what}")]
    InvalidRecord { facility_code: String, what: String },

    #[error("Record for {found} submitted in the commit for {expected}")]
    PeriodMismatch { expected: String, found: String },

    #[error("Invalid path: {message}")]
    InvalidPath { message: String },
}
