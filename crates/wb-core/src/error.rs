use thiserror::Error;

pub type WbResult<T> = Result<T, WbError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WbError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Negative value for {what}: {value}")]
    Negative { what: &'static str, value: f64 },

    #[error("Invalid calculation period {year}-{month:02}")]
    InvalidPeriod { year: i32, month: u32 },
}
