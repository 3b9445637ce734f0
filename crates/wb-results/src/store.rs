//! Storage history persistence.
//!
//! A period is committed as a unit: every facility row for the period is
//! validated before anything is written, and the JSON store replaces its file
//! with a single rename.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use wb_core::{ensure_non_negative, CalculationPeriod};

use crate::types::{HistoryFile, HistorySource, StorageHistoryRecord};
use crate::{ResultsError, ResultsResult};

const HISTORY_FILE_VERSION: u32 = 1;

type HistoryKey = (String, i32, u32);

pub trait StorageHistoryStore: Send {
    fn get(
        &self,
        facility_code: &str,
        period: CalculationPeriod,
    ) -> ResultsResult<Option<StorageHistoryRecord>>;

    /// Most recent record strictly before `period`.
    fn latest_before(
        &self,
        facility_code: &str,
        period: CalculationPeriod,
    ) -> ResultsResult<Option<StorageHistoryRecord>>;

    /// Upsert all rows for one period. Either every row is stored or none is.
    fn upsert_period(
        &mut self,
        period: CalculationPeriod,
        records: &[StorageHistoryRecord],
    ) -> ResultsResult<()>;

    /// All records ordered by facility code, then period.
    fn records(&self) -> ResultsResult<Vec<StorageHistoryRecord>>;

    /// Closing volume of the month immediately before `period`.
    fn prior_closing(
        &self,
        facility_code: &str,
        period: CalculationPeriod,
    ) -> ResultsResult<Option<f64>> {
        Ok(self
            .get(facility_code, period.previous())?
            .map(|r| r.closing_m3))
    }

    fn upsert_storage_history(
        &mut self,
        facility_code: &str,
        year: i32,
        month: u32,
        opening_m3: f64,
        closing_m3: f64,
        source: HistorySource,
    ) -> ResultsResult<()> {
        let period =
            CalculationPeriod::new(year, month).map_err(|e| ResultsError::InvalidRecord {
                facility_code: facility_code.to_string(),
                what: e.to_string(),
            })?;
        let record = StorageHistoryRecord::new(facility_code, period, opening_m3, closing_m3, source);
        self.upsert_period(period, &[record])
    }
}

fn key(record: &StorageHistoryRecord) -> HistoryKey {
    (record.facility_code.clone(), record.year, record.month)
}

fn check_record(period: CalculationPeriod, record: &StorageHistoryRecord) -> ResultsResult<()> {
    if record.year != period.year() || record.month != period.month() {
        return Err(ResultsError::PeriodMismatch {
            expected: period.to_string(),
            found: format!("{}-{:02}", record.year, record.month),
        });
    }
    for (what, value) in [("opening volume", record.opening_m3), ("closing volume", record.closing_m3)] {
        ensure_non_negative(value, what).map_err(|e| ResultsError::InvalidRecord {
            facility_code: record.facility_code.clone(),
            what: e.to_string(),
        })?;
    }
    Ok(())
}

/// Shared map logic for both stores.
#[derive(Debug, Clone, Default)]
struct HistoryMap {
    rows: BTreeMap<HistoryKey, StorageHistoryRecord>,
}

impl HistoryMap {
    fn from_records(records: Vec<StorageHistoryRecord>) -> Self {
        let rows = records.into_iter().map(|r| (key(&r), r)).collect();
        Self { rows }
    }

    fn get(&self, facility_code: &str, period: CalculationPeriod) -> Option<StorageHistoryRecord> {
        self.rows
            .get(&(facility_code.to_string(), period.year(), period.month()))
            .cloned()
    }

    fn latest_before(
        &self,
        facility_code: &str,
        period: CalculationPeriod,
    ) -> Option<StorageHistoryRecord> {
        let lo = (facility_code.to_string(), i32::MIN, 0);
        let hi = (facility_code.to_string(), period.year(), period.month());
        self.rows.range(lo..hi).next_back().map(|(_, r)| r.clone())
    }

    /// Validate everything first, then apply.
    fn apply(
        &mut self,
        period: CalculationPeriod,
        records: &[StorageHistoryRecord],
    ) -> ResultsResult<()> {
        for record in records {
            check_record(period, record)?;
        }
        for record in records {
            self.rows.insert(key(record), record.clone());
        }
        Ok(())
    }

    fn records(&self) -> Vec<StorageHistoryRecord> {
        self.rows.values().cloned().collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    map: HistoryMap,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.rows.is_empty()
    }
}

impl StorageHistoryStore for InMemoryHistory {
    fn get(
        &self,
        facility_code: &str,
        period: CalculationPeriod,
    ) -> ResultsResult<Option<StorageHistoryRecord>> {
        Ok(self.map.get(facility_code, period))
    }

    fn latest_before(
        &self,
        facility_code: &str,
        period: CalculationPeriod,
    ) -> ResultsResult<Option<StorageHistoryRecord>> {
        Ok(self.map.latest_before(facility_code, period))
    }

    fn upsert_period(
        &mut self,
        period: CalculationPeriod,
        records: &[StorageHistoryRecord],
    ) -> ResultsResult<()> {
        self.map.apply(period, records)
    }

    fn records(&self) -> ResultsResult<Vec<StorageHistoryRecord>> {
        Ok(self.map.records())
    }
}

/// History kept in a single JSON file next to the site file.
#[derive(Debug, Clone)]
pub struct JsonHistoryStore {
    path: PathBuf,
    map: HistoryMap,
}

impl JsonHistoryStore {
    /// Open `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> ResultsResult<Self> {
        let path = path.into();
        let map = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let file: HistoryFile = serde_json::from_str(&content)?;
            HistoryMap::from_records(file.records)
        } else {
            HistoryMap::default()
        };
        Ok(Self { path, map })
    }

    /// Default location for a site: `<site dir>/.waterbalance/history.json`.
    pub fn for_site(site_path: &Path) -> ResultsResult<Self> {
        let site_dir = site_path.parent().ok_or_else(|| ResultsError::InvalidPath {
            message: "site path has no parent directory".to_string(),
        })?;
        Self::open(site_dir.join(".waterbalance").join("history.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, map: &HistoryMap) -> ResultsResult<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        let file = HistoryFile {
            version: HISTORY_FILE_VERSION,
            records: map.records(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StorageHistoryStore for JsonHistoryStore {
    fn get(
        &self,
        facility_code: &str,
        period: CalculationPeriod,
    ) -> ResultsResult<Option<StorageHistoryRecord>> {
        Ok(self.map.get(facility_code, period))
    }

    fn latest_before(
        &self,
        facility_code: &str,
        period: CalculationPeriod,
    ) -> ResultsResult<Option<StorageHistoryRecord>> {
        Ok(self.map.latest_before(facility_code, period))
    }

    fn upsert_period(
        &mut self,
        period: CalculationPeriod,
        records: &[StorageHistoryRecord],
    ) -> ResultsResult<()> {
        let mut next = self.map.clone();
        next.apply(period, records)?;
        self.write_file(&next)?;
        self.map = next;
        Ok(())
    }

    fn records(&self) -> ResultsResult<Vec<StorageHistoryRecord>> {
        Ok(self.map.records())
    }
}
