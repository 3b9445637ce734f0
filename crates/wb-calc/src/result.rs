//! Balance result types.

use std::collections::BTreeMap;

use serde::Serialize;
use wb_core::CalculationPeriod;
use wb_results::HistorySource;
use wb_topology::{FacilityKind, InflowKind, IntegrityIssue, OutflowKind};

use crate::quality::DataQualityFlags;

/// Category of a flow contribution.
pub trait FlowCategory: Copy + Ord + Serialize {
    /// Inter-area transfers cancel out over the whole site.
    fn is_transfer(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InflowCategory {
    Rainfall,
    Groundwater,
    SurfaceRunoff,
    Dewatering,
    OtherMetered,
    TransferIn,
}

impl FlowCategory for InflowCategory {
    fn is_transfer(&self) -> bool {
        *self == InflowCategory::TransferIn
    }
}

impl From<InflowKind> for InflowCategory {
    fn from(kind: InflowKind) -> Self {
        match kind {
            InflowKind::Rainfall => InflowCategory::Rainfall,
            InflowKind::Groundwater => InflowCategory::Groundwater,
            InflowKind::SurfaceRunoff => InflowCategory::SurfaceRunoff,
            InflowKind::Dewatering => InflowCategory::Dewatering,
            InflowKind::Other => InflowCategory::OtherMetered,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutflowCategory {
    Consumption,
    DustSuppression,
    Spillage,
    ProductBound,
    InterstitialStorage,
    OtherMetered,
    Evaporation,
    Seepage,
    TransferOut,
}

impl FlowCategory for OutflowCategory {
    fn is_transfer(&self) -> bool {
        *self == OutflowCategory::TransferOut
    }
}

impl From<OutflowKind> for OutflowCategory {
    fn from(kind: OutflowKind) -> Self {
        match kind {
            OutflowKind::Evaporation => OutflowCategory::Evaporation,
            OutflowKind::Seepage => OutflowCategory::Seepage,
            OutflowKind::DustSuppression => OutflowCategory::DustSuppression,
            OutflowKind::Spillage => OutflowCategory::Spillage,
            OutflowKind::Consumption => OutflowCategory::Consumption,
            OutflowKind::ProductBound => OutflowCategory::ProductBound,
            OutflowKind::InterstitialStorage => OutflowCategory::InterstitialStorage,
            OutflowKind::Other => OutflowCategory::OtherMetered,
        }
    }
}

/// One itemised volume.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution<C> {
    pub category: C,
    /// Area code; `None` for facilities not hosted by any structure.
    pub area: Option<String>,
    /// Facility receiving or losing the water, when there is one.
    pub facility: Option<String>,
    pub label: String,
    pub volume_m3: f64,
}

/// Totals plus breakdowns for one flow direction.
///
/// `total_m3` is the site total and leaves out inter-area transfers, which
/// are reported in `transfer_m3`. `by_area` includes them: a transfer is an
/// inflow to its destination area and an outflow from its source area.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowTotals<C: FlowCategory> {
    pub total_m3: f64,
    pub transfer_m3: f64,
    pub by_category: BTreeMap<C, f64>,
    pub by_area: BTreeMap<String, f64>,
    pub items: Vec<Contribution<C>>,
}

impl<C: FlowCategory> Default for FlowTotals<C> {
    fn default() -> Self {
        Self {
            total_m3: 0.0,
            transfer_m3: 0.0,
            by_category: BTreeMap::new(),
            by_area: BTreeMap::new(),
            items: Vec::new(),
        }
    }
}

impl<C: FlowCategory> FlowTotals<C> {
    pub fn add(&mut self, item: Contribution<C>) {
        if item.category.is_transfer() {
            self.transfer_m3 += item.volume_m3;
        } else {
            self.total_m3 += item.volume_m3;
        }
        *self.by_category.entry(item.category).or_insert(0.0) += item.volume_m3;
        if let Some(area) = &item.area {
            *self.by_area.entry(area.clone()).or_insert(0.0) += item.volume_m3;
        }
        self.items.push(item);
    }

    pub fn category(&self, category: C) -> f64 {
        self.by_category.get(&category).copied().unwrap_or(0.0)
    }

    pub fn area(&self, area_code: &str) -> f64 {
        self.by_area.get(area_code).copied().unwrap_or(0.0)
    }

    /// Net volume attributed to each facility.
    pub fn by_facility(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for item in &self.items {
            if let Some(facility) = &item.facility {
                *out.entry(facility.clone()).or_insert(0.0) += item.volume_m3;
            }
        }
        out
    }
}

pub type InflowResult = FlowTotals<InflowCategory>;
pub type OutflowResult = FlowTotals<OutflowCategory>;

/// Where an opening volume came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpeningSource {
    /// Prior period closing from storage history.
    History,
    /// Measured level of the prior period.
    MeasuredPrior,
    /// Closing of an earlier period; the months in between were never computed.
    CarriedForward,
    /// The facility's current volume; first period for this facility.
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityStorage {
    pub code: String,
    pub name: String,
    pub kind: FacilityKind,
    pub area: Option<String>,
    pub active: bool,
    pub capacity_m3: f64,
    pub opening_m3: f64,
    pub closing_m3: f64,
    pub delta_m3: f64,
    pub opening_source: OpeningSource,
    pub closing_source: HistorySource,
    /// Calculated flows attributed to the facility (in minus out).
    pub net_flow_m3: f64,
    pub utilisation_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageChange {
    pub opening_m3: f64,
    pub closing_m3: f64,
    pub delta_m3: f64,
    /// Active facilities; these make up the totals.
    pub facilities: Vec<FacilityStorage>,
    /// Inactive facilities, reported only on request and never totalled.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inactive: Vec<FacilityStorage>,
}

impl StorageChange {
    pub fn facility(&self, code: &str) -> Option<&FacilityStorage> {
        self.facilities.iter().find(|f| f.code == code)
    }
}

/// How far a balance can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStatus {
    Closed,
    Warning,
    Poor,
}

impl BalanceStatus {
    pub fn classify(error_pct: f64, warn_pct: f64, fail_pct: f64, degraded: bool) -> Self {
        let magnitude = error_pct.abs();
        if magnitude > fail_pct {
            BalanceStatus::Poor
        } else if magnitude > warn_pct || degraded {
            BalanceStatus::Warning
        } else {
            BalanceStatus::Closed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceStatus::Closed => "closed",
            BalanceStatus::Warning => "warning",
            BalanceStatus::Poor => "poor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaBalance {
    pub area_code: String,
    pub area_name: String,
    pub inflow_m3: f64,
    pub outflow_m3: f64,
    pub transfer_in_m3: f64,
    pub transfer_out_m3: f64,
    pub storage_delta_m3: f64,
    pub balance_error_m3: f64,
    pub error_pct: f64,
}

/// Outcome of one period calculation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceResult {
    pub period: CalculationPeriod,
    pub label: String,
    pub inflows: InflowResult,
    pub outflows: OutflowResult,
    pub storage: StorageChange,
    /// `inflows.total_m3 - outflows.total_m3 - storage.delta_m3`.
    pub balance_error_m3: f64,
    pub error_pct: f64,
    pub status: BalanceStatus,
    pub areas: Vec<AreaBalance>,
    pub quality: DataQualityFlags,
    pub integrity: Vec<IntegrityIssue>,
    /// Input hash the result was computed from.
    pub fingerprint: String,
    pub computed_at: String,
}

impl BalanceResult {
    pub fn area(&self, code: &str) -> Option<&AreaBalance> {
        self.areas.iter().find(|a| a.area_code == code)
    }

    /// Equality of everything except cache metadata.
    pub fn same_balance(&self, other: &BalanceResult) -> bool {
        self.period == other.period
            && self.inflows == other.inflows
            && self.outflows == other.outflows
            && self.storage == other.storage
            && self.balance_error_m3 == other.balance_error_m3
            && self.error_pct == other.error_pct
            && self.status == other.status
            && self.areas == other.areas
            && self.quality == other.quality
    }
}

/// `error / max(inflow, epsilon) * 100`.
pub fn error_percent(error_m3: f64, inflow_m3: f64, epsilon_m3: f64) -> f64 {
    error_m3 / inflow_m3.max(epsilon_m3) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(category: InflowCategory, area: &str, v: f64) -> Contribution<InflowCategory> {
        Contribution {
            category,
            area: Some(area.into()),
            facility: None,
            label: "x".into(),
            volume_m3: v,
        }
    }

    #[test]
    fn transfers_stay_out_of_site_total() {
        let mut totals = InflowResult::default();
        totals.add(item(InflowCategory::Groundwater, "UG", 100.0));
        totals.add(item(InflowCategory::TransferIn, "PLANT", 40.0));
        assert_eq!(totals.total_m3, 100.0);
        assert_eq!(totals.transfer_m3, 40.0);
        assert_eq!(totals.area("PLANT"), 40.0);
        assert_eq!(totals.category(InflowCategory::TransferIn), 40.0);
    }

    #[test]
    fn error_percent_guards_zero_inflow() {
        assert_eq!(error_percent(5.0, 100.0, 1e-6), 5.0);
        assert!(error_percent(1.0, 0.0, 1e-6).is_finite());
        assert_eq!(error_percent(0.0, 0.0, 1e-6), 0.0);
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(BalanceStatus::classify(1.0, 5.0, 10.0, false), BalanceStatus::Closed);
        assert_eq!(BalanceStatus::classify(-6.0, 5.0, 10.0, false), BalanceStatus::Warning);
        assert_eq!(BalanceStatus::classify(1.0, 5.0, 10.0, true), BalanceStatus::Warning);
        assert_eq!(BalanceStatus::classify(12.0, 5.0, 10.0, false), BalanceStatus::Poor);
    }
}
