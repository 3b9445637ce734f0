//! Error types for the wb-app service layer.

use std::path::PathBuf;

/// Application error wrapping the backend crates behind one interface.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Project error: {0}")]
    Project(String),

    #[error("Failed to read site file: {path}")]
    SiteFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write site file: {path}")]
    SiteFileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Site compilation failed: {0}")]
    Compile(String),

    #[error("Calculation error: {0}")]
    Calc(#[from] wb_calc::CalcError),

    #[error("History error: {0}")]
    History(#[from] wb_results::ResultsError),

    #[error("Area not found: {0}")]
    AreaNotFound(String),

    #[error("No balance service installed")]
    ServiceNotInstalled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<wb_project::ProjectError> for AppError {
    fn from(err: wb_project::ProjectError) -> Self {
        AppError::Project(err.to_string())
    }
}

impl From<wb_topology::TopologyError> for AppError {
    fn from(err: wb_topology::TopologyError) -> Self {
        AppError::Compile(err.to_string())
    }
}

impl From<wb_core::WbError> for AppError {
    fn from(err: wb_core::WbError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}
