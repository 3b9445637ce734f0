//! wb-project: canonical site file format and validation.

pub mod columns;
pub mod migrate;
pub mod schema;
pub mod validate;

pub use columns::{merge_measurements, read_measurements_csv, Column, ColumnMap};
pub use migrate::{migrate_to_latest, LATEST_VERSION};
pub use schema::*;
pub use validate::{validate_project, ValidationError};

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Migration error: {what}")]
    Migration { what: String },

    #[error("Column error: {what}")]
    Column { what: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// On-disk encoding of a site file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteFormat {
    Yaml,
    Json,
}

impl SiteFormat {
    /// `.json` is JSON, anything else YAML.
    pub fn from_path(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SiteFormat::Json,
            _ => SiteFormat::Yaml,
        }
    }
}

/// Parse, migrate and validate a site file's contents.
pub fn parse_site(content: &str, format: SiteFormat) -> ProjectResult<SiteProject> {
    let project: SiteProject = match format {
        SiteFormat::Yaml => serde_yaml::from_str(content)?,
        SiteFormat::Json => serde_json::from_str(content)?,
    };
    let project = migrate_to_latest(project)?;
    validate_project(&project)?;
    Ok(project)
}

/// Validate and serialize a site.
pub fn render_site(project: &SiteProject, format: SiteFormat) -> ProjectResult<String> {
    validate_project(project)?;
    Ok(match format {
        SiteFormat::Yaml => serde_yaml::to_string(project)?,
        SiteFormat::Json => serde_json::to_string_pretty(project)?,
    })
}
