//! Site data model.
//!
//! Areas own structures; structures are joined by directed flow connections.
//! Inflow sources and outflow destinations are sentinel pseudo-nodes that
//! terminate the flow graph: they are never walked, only aggregated.

use serde::{Deserialize, Serialize};
use wb_core::{AreaId, ConnectionId, FacilityId, StructureId};

/// A named zone of the site (mining section, plant, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Area {
    pub id: AreaId,
    pub code: String,
    pub name: String,
}

/// Physical node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    Dam,
    Sump,
    Plant,
    Borehole,
    Junction,
    Tank,
    /// Grouping node; the only kind allowed to live outside an area.
    Group,
    Other,
}

/// A physical node: dam, sump, plant, borehole, junction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Structure {
    pub id: StructureId,
    pub code: String,
    pub name: String,
    pub kind: StructureKind,
    pub parent: Option<StructureId>,
    pub area: Option<AreaId>,
    /// Catchment draining into this structure, used for rainfall sentinels.
    pub catchment_area_m2: Option<f64>,
}

impl Structure {
    pub fn is_group(&self) -> bool {
        self.kind == StructureKind::Group
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    Clean,
    Dirty,
    Dewatering,
    Stormwater,
    UgReturn,
    Other,
}

/// A directed (optionally bidirectional) edge between two structures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowConnection {
    pub id: ConnectionId,
    pub from: StructureId,
    pub to: StructureId,
    pub flow_type: FlowType,
    /// Free-form sub-classification, e.g. "dam_return" or "consumption".
    pub subcategory: String,
    pub bidirectional: bool,
    /// Both ends share an area.
    pub internal: bool,
    pub notes: Option<String>,
}

/// Identity of a flow connection. Must be unique across the topology.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub from: StructureId,
    pub to: StructureId,
    pub flow_type: FlowType,
    pub subcategory: String,
    pub bidirectional: bool,
    pub internal: bool,
}

impl FlowConnection {
    pub fn key(&self) -> ConnectionKey {
        ConnectionKey {
            from: self.from,
            to: self.to,
            flow_type: self.flow_type,
            subcategory: self.subcategory.clone(),
            bidirectional: self.bidirectional,
            internal: self.internal,
        }
    }

    /// Return flows feed recycled water back into the circuit.
    pub fn is_return_flow(&self) -> bool {
        self.flow_type == FlowType::UgReturn || self.subcategory == "dam_return"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InflowKind {
    Rainfall,
    Groundwater,
    SurfaceRunoff,
    Dewatering,
    Other,
}

/// Exogenous input into a structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InflowSource {
    pub code: String,
    pub name: String,
    pub target: StructureId,
    pub kind: InflowKind,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutflowKind {
    Evaporation,
    Seepage,
    DustSuppression,
    Spillage,
    Consumption,
    ProductBound,
    InterstitialStorage,
    Other,
}

impl OutflowKind {
    /// Losses that storage facilities derive from their own attributes.
    pub fn is_physical_loss(&self) -> bool {
        matches!(self, OutflowKind::Evaporation | OutflowKind::Seepage)
    }
}

/// Exogenous output leaving a structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutflowDestination {
    pub code: String,
    pub name: String,
    pub source: StructureId,
    pub kind: OutflowKind,
    pub notes: Option<String>,
}

/// A flow connection crossing an area boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterAreaTransfer {
    pub connection: ConnectionId,
    pub from_area: AreaId,
    pub to_area: AreaId,
    pub from_structure: StructureId,
    pub to_structure: StructureId,
    pub flow_type: FlowType,
    pub subcategory: String,
    pub bidirectional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityKind {
    Tank,
    Pond,
    Dam,
    Other,
}

impl FacilityKind {
    /// Tanks are closed vessels: no open water surface and no lining.
    pub fn has_open_surface(&self) -> bool {
        !matches!(self, FacilityKind::Tank)
    }
}

/// A physical storage unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageFacility {
    pub id: FacilityId,
    pub code: String,
    pub name: String,
    pub kind: FacilityKind,
    pub capacity_m3: f64,
    pub current_volume_m3: f64,
    pub surface_area_m2: Option<f64>,
    /// Meaningless for tanks; must stay `None` there.
    pub is_lined: Option<bool>,
    pub active: bool,
    pub structure: Option<StructureId>,
}

impl StorageFacility {
    pub fn is_tank(&self) -> bool {
        self.kind == FacilityKind::Tank
    }

    /// Surface exposed to rain and evaporation; `None` for tanks or when unknown/zero.
    pub fn open_surface_m2(&self) -> Option<f64> {
        if !self.kind.has_open_surface() {
            return None;
        }
        self.surface_area_m2.filter(|a| *a > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wb_core::Id;

    fn facility(kind: FacilityKind, surface: Option<f64>) -> StorageFacility {
        StorageFacility {
            id: Id::from_index(0),
            code: "F".into(),
            name: "F".into(),
            kind,
            capacity_m3: 100.0,
            current_volume_m3: 50.0,
            surface_area_m2: surface,
            is_lined: None,
            active: true,
            structure: None,
        }
    }

    #[test]
    fn tank_has_no_open_surface() {
        assert_eq!(facility(FacilityKind::Tank, Some(20.0)).open_surface_m2(), None);
        assert_eq!(facility(FacilityKind::Dam, Some(20.0)).open_surface_m2(), Some(20.0));
        assert_eq!(facility(FacilityKind::Pond, Some(0.0)).open_surface_m2(), None);
    }

    #[test]
    fn return_flow_detection() {
        let conn = FlowConnection {
            id: Id::from_index(0),
            from: Id::from_index(0),
            to: Id::from_index(1),
            flow_type: FlowType::Dirty,
            subcategory: "dam_return".into(),
            bidirectional: false,
            internal: true,
            notes: None,
        };
        assert!(conn.is_return_flow());
        assert!(OutflowKind::Seepage.is_physical_loss());
        assert!(!OutflowKind::Spillage.is_physical_loss());
    }
}
