//! Site file schema definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use wb_topology::{FacilityKind, FlowType, InflowKind, OutflowKind, StructureKind};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteProject {
    pub version: u32,
    pub name: String,
    /// Named numeric constants (seepage rates, reserves, thresholds).
    #[serde(default)]
    pub constants: BTreeMap<String, f64>,
    #[serde(default)]
    pub options: EngineOptionsDef,
    #[serde(default)]
    pub areas: Vec<AreaDef>,
    #[serde(default)]
    pub structures: Vec<StructureDef>,
    #[serde(default)]
    pub connections: Vec<ConnectionDef>,
    #[serde(default)]
    pub inflow_sources: Vec<InflowSourceDef>,
    #[serde(default)]
    pub outflow_destinations: Vec<OutflowDestinationDef>,
    #[serde(default)]
    pub facilities: Vec<FacilityDef>,
    #[serde(default)]
    pub measurements: Vec<MonthlyMeasurementsDef>,
}

impl SiteProject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: crate::migrate::LATEST_VERSION,
            name: name.into(),
            constants: BTreeMap::new(),
            options: EngineOptionsDef::default(),
            areas: Vec::new(),
            structures: Vec::new(),
            connections: Vec::new(),
            inflow_sources: Vec::new(),
            outflow_destinations: Vec::new(),
            facilities: Vec::new(),
            measurements: Vec::new(),
        }
    }

    pub fn measurements_for(&self, year: i32, month: u32) -> Option<&MonthlyMeasurementsDef> {
        self.measurements
            .iter()
            .find(|m| m.year == year && m.month == month)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineOptionsDef {
    /// Reject topologies that break house rules instead of reporting them.
    #[serde(default)]
    pub strict_topology: bool,
    /// Write storage history rows after each calculation.
    #[serde(default = "default_true")]
    pub persist_history: bool,
    /// List inactive facilities in the storage breakdown.
    #[serde(default)]
    pub report_inactive_facilities: bool,
}

impl Default for EngineOptionsDef {
    fn default() -> Self {
        Self {
            strict_topology: false,
            persist_history: true,
            report_inactive_facilities: false,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AreaDef {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructureDef {
    pub code: String,
    pub name: String,
    pub kind: StructureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catchment_area_m2: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionDef {
    pub from: String,
    pub to: String,
    pub flow_type: FlowType,
    #[serde(default)]
    pub subcategory: String,
    #[serde(default)]
    pub bidirectional: bool,
    /// Absent in version 1 files; filled from structure areas on migration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InflowSourceDef {
    pub code: String,
    pub name: String,
    pub target: String,
    pub kind: InflowKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutflowDestinationDef {
    pub code: String,
    pub name: String,
    pub source: String,
    pub kind: OutflowKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FacilityDef {
    pub code: String,
    pub name: String,
    pub kind: FacilityKind,
    pub capacity_m3: f64,
    #[serde(default)]
    pub current_volume_m3: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_area_m2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_lined: Option<bool>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<String>,
}

/// Everything measured for one calendar month.
///
/// Flow keys use structure or sentinel codes: an inflow source is metered as
/// `source -> structure`, an outflow destination as `structure -> destination`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MonthlyMeasurementsDef {
    pub year: i32,
    pub month: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rainfall_mm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regional_evaporation_mm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ore_tonnes: Option<f64>,
    #[serde(default)]
    pub flows: Vec<FlowVolumeDef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub facility_evaporation_mm: BTreeMap<String, f64>,
    /// Measured closing volume per facility.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub storage_volumes_m3: BTreeMap<String, f64>,
}

impl MonthlyMeasurementsDef {
    pub fn new(year: i32, month: u32) -> Self {
        Self {
            year,
            month,
            ..Default::default()
        }
    }

    pub fn flow_volume(&self, from: &str, to: &str) -> Option<f64> {
        self.flows
            .iter()
            .find(|f| f.from == from && f.to == to)
            .map(|f| f.volume_m3)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowVolumeDef {
    pub from: String,
    pub to: String,
    pub volume_m3: f64,
}
