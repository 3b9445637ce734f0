//! Storage history record types.

use serde::{Deserialize, Serialize};
use wb_core::CalculationPeriod;

/// Where a closing volume came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    Measured,
    Calculated,
}

impl HistorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistorySource::Measured => "measured",
            HistorySource::Calculated => "calculated",
        }
    }
}

/// One row per (facility, year, month).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageHistoryRecord {
    pub facility_code: String,
    pub year: i32,
    pub month: u32,
    pub opening_m3: f64,
    pub closing_m3: f64,
    pub source: HistorySource,
    /// RFC 3339 timestamp of the last write.
    #[serde(default)]
    pub recorded_at: String,
}

impl StorageHistoryRecord {
    pub fn new(
        facility_code: impl Into<String>,
        period: CalculationPeriod,
        opening_m3: f64,
        closing_m3: f64,
        source: HistorySource,
    ) -> Self {
        Self {
            facility_code: facility_code.into(),
            year: period.year(),
            month: period.month(),
            opening_m3,
            closing_m3,
            source,
            recorded_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// `None` when the stored month is out of range.
    pub fn period(&self) -> Option<CalculationPeriod> {
        CalculationPeriod::new(self.year, self.month).ok()
    }

    pub fn delta_m3(&self) -> f64 {
        self.closing_m3 - self.opening_m3
    }
}

/// On-disk layout of a history file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryFile {
    pub version: u32,
    #[serde(default)]
    pub records: Vec<StorageHistoryRecord>,
}
