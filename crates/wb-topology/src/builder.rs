//! Incremental topology builder.

use wb_core::{AreaId, ConnectionId, FacilityId, StructureId};

use crate::error::TopologyResult;
use crate::model::{
    Area, FacilityKind, FlowConnection, FlowType, InflowKind, InflowSource, OutflowDestination,
    OutflowKind, StorageFacility, Structure, StructureKind,
};
use crate::topology::Topology;
use crate::validate;

/// Flow connection to be added to a builder.
///
/// `internal` left as `None` is derived from the endpoint areas at build time.
#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    pub from: StructureId,
    pub to: StructureId,
    pub flow_type: FlowType,
    pub subcategory: String,
    pub bidirectional: bool,
    pub internal: Option<bool>,
    pub notes: Option<String>,
}

impl ConnectionSpec {
    pub fn new(from: StructureId, to: StructureId, flow_type: FlowType) -> Self {
        Self {
            from,
            to,
            flow_type,
            subcategory: String::new(),
            bidirectional: false,
            internal: None,
            notes: None,
        }
    }

    pub fn subcategory(mut self, subcategory: impl Into<String>) -> Self {
        self.subcategory = subcategory.into();
        self
    }

    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = Some(internal);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Storage facility to be added to a builder.
#[derive(Debug, Clone)]
pub struct FacilitySpec {
    pub code: String,
    pub name: String,
    pub kind: FacilityKind,
    pub capacity_m3: f64,
    pub current_volume_m3: f64,
    pub surface_area_m2: Option<f64>,
    pub is_lined: Option<bool>,
    pub active: bool,
    pub structure: Option<StructureId>,
}

impl FacilitySpec {
    pub fn new(code: impl Into<String>, kind: FacilityKind, capacity_m3: f64) -> Self {
        let code = code.into();
        Self {
            name: code.clone(),
            code,
            kind,
            capacity_m3,
            current_volume_m3: 0.0,
            surface_area_m2: None,
            is_lined: None,
            active: true,
            structure: None,
        }
    }
}

/// Builder for constructing a topology incrementally.
///
/// Use the `add_*` methods to build up the site, then call `build()` to
/// validate and freeze it into an immutable `Topology`.
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    areas: Vec<Area>,
    structures: Vec<Structure>,
    connections: Vec<ConnectionSpec>,
    inflow_sources: Vec<InflowSource>,
    outflow_destinations: Vec<OutflowDestination>,
    facilities: Vec<StorageFacility>,
}

impl TopologyBuilder {
    /// Create a new empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_area(&mut self, code: impl Into<String>, name: impl Into<String>) -> AreaId {
        let id = AreaId::from_index(self.areas.len() as u32);
        self.areas.push(Area {
            id,
            code: code.into(),
            name: name.into(),
        });
        id
    }

    pub fn add_structure(
        &mut self,
        code: impl Into<String>,
        name: impl Into<String>,
        kind: StructureKind,
        area: Option<AreaId>,
    ) -> StructureId {
        let id = StructureId::from_index(self.structures.len() as u32);
        self.structures.push(Structure {
            id,
            code: code.into(),
            name: name.into(),
            kind,
            parent: None,
            area,
            catchment_area_m2: None,
        });
        id
    }

    /// Place a structure under a group structure.
    pub fn set_parent(&mut self, child: StructureId, parent: StructureId) {
        if let Some(s) = self.structures.get_mut(child.as_usize()) {
            s.parent = Some(parent);
        }
    }

    pub fn set_catchment_area(&mut self, structure: StructureId, area_m2: f64) {
        if let Some(s) = self.structures.get_mut(structure.as_usize()) {
            s.catchment_area_m2 = Some(area_m2);
        }
    }

    pub fn add_connection(&mut self, spec: ConnectionSpec) -> ConnectionId {
        let id = ConnectionId::from_index(self.connections.len() as u32);
        self.connections.push(spec);
        id
    }

    pub fn add_inflow_source(
        &mut self,
        code: impl Into<String>,
        name: impl Into<String>,
        target: StructureId,
        kind: InflowKind,
    ) {
        self.inflow_sources.push(InflowSource {
            code: code.into(),
            name: name.into(),
            target,
            kind,
            notes: None,
        });
    }

    pub fn add_outflow_destination(
        &mut self,
        code: impl Into<String>,
        name: impl Into<String>,
        source: StructureId,
        kind: OutflowKind,
    ) {
        self.outflow_destinations.push(OutflowDestination {
            code: code.into(),
            name: name.into(),
            source,
            kind,
            notes: None,
        });
    }

    pub fn add_facility(&mut self, spec: FacilitySpec) -> FacilityId {
        let id = FacilityId::from_index(self.facilities.len() as u32);
        self.facilities.push(StorageFacility {
            id,
            code: spec.code,
            name: spec.name,
            kind: spec.kind,
            capacity_m3: spec.capacity_m3,
            current_volume_m3: spec.current_volume_m3,
            surface_area_m2: spec.surface_area_m2,
            is_lined: spec.is_lined,
            active: spec.active,
            structure: spec.structure,
        });
        id
    }

    /// Validate and freeze the topology.
    pub fn build(self) -> TopologyResult<Topology> {
        validate::validate_structure(
            &self.areas,
            &self.structures,
            &self.connections,
            &self.inflow_sources,
            &self.outflow_destinations,
            &self.facilities,
        )?;

        let connections = self
            .connections
            .into_iter()
            .enumerate()
            .map(|(i, spec)| {
                let same_area = self.structures[spec.from.as_usize()].area
                    == self.structures[spec.to.as_usize()].area;
                FlowConnection {
                    id: ConnectionId::from_index(i as u32),
                    from: spec.from,
                    to: spec.to,
                    flow_type: spec.flow_type,
                    subcategory: spec.subcategory,
                    bidirectional: spec.bidirectional,
                    internal: spec.internal.unwrap_or(same_area),
                    notes: spec.notes,
                }
            })
            .collect();

        Ok(Topology::assemble(
            self.areas,
            self.structures,
            connections,
            self.inflow_sources,
            self.outflow_destinations,
            self.facilities,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TopologyError;

    #[test]
    fn builder_assigns_contiguous_ids() {
        let mut builder = TopologyBuilder::new();
        let a = builder.add_area("A", "Area A");
        let s1 = builder.add_structure("S1", "S1", StructureKind::Dam, Some(a));
        let s2 = builder.add_structure("S2", "S2", StructureKind::Plant, Some(a));
        let c = builder.add_connection(ConnectionSpec::new(s1, s2, FlowType::Clean));

        assert_eq!(a.index(), 0);
        assert_eq!(s1.index(), 0);
        assert_eq!(s2.index(), 1);
        assert_eq!(c.index(), 0);
    }

    #[test]
    fn internal_flag_derived_from_areas() {
        let mut builder = TopologyBuilder::new();
        let a = builder.add_area("A", "A");
        let b = builder.add_area("B", "B");
        let s1 = builder.add_structure("S1", "S1", StructureKind::Dam, Some(a));
        let s2 = builder.add_structure("S2", "S2", StructureKind::Plant, Some(a));
        let s3 = builder.add_structure("S3", "S3", StructureKind::Sump, Some(b));
        let same = builder.add_connection(ConnectionSpec::new(s1, s2, FlowType::Clean));
        let cross = builder.add_connection(ConnectionSpec::new(s2, s3, FlowType::Dirty));
        let topo = builder.build().unwrap();

        assert!(topo.connection(same).unwrap().internal);
        assert!(!topo.connection(cross).unwrap().internal);
    }

    #[test]
    fn explicit_internal_flag_is_kept() {
        let mut builder = TopologyBuilder::new();
        let a = builder.add_area("A", "A");
        let s1 = builder.add_structure("S1", "S1", StructureKind::Dam, Some(a));
        let s2 = builder.add_structure("S2", "S2", StructureKind::Plant, Some(a));
        let c = builder.add_connection(ConnectionSpec::new(s1, s2, FlowType::Clean).internal(false));
        let topo = builder.build().unwrap();
        assert!(!topo.connection(c).unwrap().internal);
    }

    #[test]
    fn build_rejects_structure_without_area() {
        let mut builder = TopologyBuilder::new();
        builder.add_structure("LOOSE", "Loose", StructureKind::Dam, None);
        assert!(matches!(
            builder.build(),
            Err(TopologyError::StructureWithoutArea { .. })
        ));
    }
}
