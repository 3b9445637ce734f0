//! Immutable, indexed topology snapshot.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use wb_core::{AreaId, ConnectionId, FacilityId, StructureId};

use crate::error::{TopologyError, TopologyResult};
use crate::model::{
    Area, FlowConnection, InflowSource, InterAreaTransfer, OutflowDestination, StorageFacility,
    Structure,
};

/// The topology: a validated, immutable collection of areas, structures,
/// connections, sentinels and storage facilities.
///
/// Objects are stored in vectors indexed by their IDs. Lookup tables are
/// built once at construction and never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct Topology {
    areas: Vec<Area>,
    structures: Vec<Structure>,
    connections: Vec<FlowConnection>,
    inflow_sources: Vec<InflowSource>,
    outflow_destinations: Vec<OutflowDestination>,
    facilities: Vec<StorageFacility>,

    #[serde(skip)]
    transfers: Vec<InterAreaTransfer>,
    #[serde(skip)]
    area_codes: HashMap<String, AreaId>,
    #[serde(skip)]
    structure_codes: HashMap<String, StructureId>,
    #[serde(skip)]
    facility_codes: HashMap<String, FacilityId>,
    /// Connections touching each structure, in connection order.
    #[serde(skip)]
    structure_connections: Vec<Vec<ConnectionId>>,
    #[serde(skip)]
    structure_facilities: HashMap<StructureId, Vec<FacilityId>>,
    /// Connections repeating the key of an earlier connection.
    #[serde(skip)]
    duplicates: HashSet<ConnectionId>,
}

impl Topology {
    pub(crate) fn assemble(
        areas: Vec<Area>,
        structures: Vec<Structure>,
        connections: Vec<FlowConnection>,
        inflow_sources: Vec<InflowSource>,
        outflow_destinations: Vec<OutflowDestination>,
        facilities: Vec<StorageFacility>,
    ) -> Self {
        let area_codes = areas.iter().map(|a| (a.code.clone(), a.id)).collect();
        let structure_codes = structures.iter().map(|s| (s.code.clone(), s.id)).collect();
        let facility_codes = facilities.iter().map(|f| (f.code.clone(), f.id)).collect();

        let mut structure_connections = vec![Vec::new(); structures.len()];
        let mut seen_keys = HashSet::new();
        let mut duplicates = HashSet::new();
        for c in &connections {
            structure_connections[c.from.as_usize()].push(c.id);
            if c.to != c.from {
                structure_connections[c.to.as_usize()].push(c.id);
            }
            if !seen_keys.insert(c.key()) {
                duplicates.insert(c.id);
            }
        }

        let mut structure_facilities: HashMap<StructureId, Vec<FacilityId>> = HashMap::new();
        for f in &facilities {
            if let Some(s) = f.structure {
                structure_facilities.entry(s).or_default().push(f.id);
            }
        }

        let transfers = connections
            .iter()
            .filter(|c| !c.internal && !duplicates.contains(&c.id))
            .filter_map(|c| {
                let from_area = structures[c.from.as_usize()].area?;
                let to_area = structures[c.to.as_usize()].area?;
                (from_area != to_area).then(|| InterAreaTransfer {
                    connection: c.id,
                    from_area,
                    to_area,
                    from_structure: c.from,
                    to_structure: c.to,
                    flow_type: c.flow_type,
                    subcategory: c.subcategory.clone(),
                    bidirectional: c.bidirectional,
                })
            })
            .collect();

        Self {
            areas,
            structures,
            connections,
            inflow_sources,
            outflow_destinations,
            facilities,
            transfers,
            area_codes,
            structure_codes,
            facility_codes,
            structure_connections,
            structure_facilities,
            duplicates,
        }
    }

    pub fn get_areas(&self) -> &[Area] {
        &self.areas
    }

    /// All structures, or only those owned by `area`.
    pub fn get_structures(&self, area: Option<AreaId>) -> Vec<&Structure> {
        self.structures
            .iter()
            .filter(|s| area.is_none() || s.area == area)
            .collect()
    }

    /// All connections, or only those touching `structure`.
    pub fn get_flow_connections(&self, structure: Option<StructureId>) -> Vec<&FlowConnection> {
        match structure {
            None => self.connections.iter().collect(),
            Some(s) => self
                .structure_connections
                .get(s.as_usize())
                .map(|ids| ids.iter().map(|id| &self.connections[id.as_usize()]).collect())
                .unwrap_or_default(),
        }
    }

    pub fn get_inflow_sources(&self, structure: StructureId) -> Vec<&InflowSource> {
        self.inflow_sources
            .iter()
            .filter(|s| s.target == structure)
            .collect()
    }

    pub fn get_outflow_destinations(&self, structure: StructureId) -> Vec<&OutflowDestination> {
        self.outflow_destinations
            .iter()
            .filter(|d| d.source == structure)
            .collect()
    }

    pub fn inflow_sources(&self) -> &[InflowSource] {
        &self.inflow_sources
    }

    pub fn outflow_destinations(&self) -> &[OutflowDestination] {
        &self.outflow_destinations
    }

    /// Non-internal connections whose endpoint areas differ. Duplicates excluded.
    pub fn get_inter_area_transfers(&self) -> &[InterAreaTransfer] {
        &self.transfers
    }

    pub fn get_storage_facilities(&self, active_only: bool) -> Vec<&StorageFacility> {
        self.facilities
            .iter()
            .filter(|f| !active_only || f.active)
            .collect()
    }

    pub fn area(&self, id: AreaId) -> Option<&Area> {
        self.areas.get(id.as_usize())
    }

    pub fn structure(&self, id: StructureId) -> Option<&Structure> {
        self.structures.get(id.as_usize())
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&FlowConnection> {
        self.connections.get(id.as_usize())
    }

    pub fn facility(&self, id: FacilityId) -> Option<&StorageFacility> {
        self.facilities.get(id.as_usize())
    }

    pub fn area_by_code(&self, code: &str) -> TopologyResult<&Area> {
        self.area_codes
            .get(code)
            .and_then(|id| self.area(*id))
            .ok_or_else(|| TopologyError::UnknownCode {
                what: "area",
                code: code.to_string(),
            })
    }

    pub fn structure_by_code(&self, code: &str) -> TopologyResult<&Structure> {
        self.structure_codes
            .get(code)
            .and_then(|id| self.structure(*id))
            .ok_or_else(|| TopologyError::UnknownCode {
                what: "structure",
                code: code.to_string(),
            })
    }

    pub fn facility_by_code(&self, code: &str) -> TopologyResult<&StorageFacility> {
        self.facility_codes
            .get(code)
            .and_then(|id| self.facility(*id))
            .ok_or_else(|| TopologyError::UnknownCode {
                what: "facility",
                code: code.to_string(),
            })
    }

    /// Owning area of a structure (`None` for groups).
    pub fn area_of(&self, structure: StructureId) -> Option<&Area> {
        self.structure(structure)
            .and_then(|s| s.area)
            .and_then(|a| self.area(a))
    }

    /// Facilities hosted by a structure.
    pub fn facilities_at(&self, structure: StructureId) -> Vec<&StorageFacility> {
        self.structure_facilities
            .get(&structure)
            .map(|ids| ids.iter().filter_map(|id| self.facility(*id)).collect())
            .unwrap_or_default()
    }

    /// First active facility hosted by a structure, the one that receives its flows.
    pub fn primary_facility_at(&self, structure: StructureId) -> Option<&StorageFacility> {
        self.facilities_at(structure).into_iter().find(|f| f.active)
    }

    pub fn is_duplicate(&self, connection: ConnectionId) -> bool {
        self.duplicates.contains(&connection)
    }

    pub fn duplicate_connections(&self) -> impl Iterator<Item = &FlowConnection> {
        self.connections
            .iter()
            .filter(move |c| self.duplicates.contains(&c.id))
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::{ConnectionSpec, FacilitySpec, TopologyBuilder};
    use crate::model::{FacilityKind, FlowType, StructureKind};

    #[test]
    fn lookups_by_code_and_area() {
        let mut b = TopologyBuilder::new();
        let a = b.add_area("A", "A");
        let z = b.add_area("Z", "Z");
        let s1 = b.add_structure("S1", "S1", StructureKind::Dam, Some(a));
        b.add_structure("S2", "S2", StructureKind::Plant, Some(z));
        let mut spec = FacilitySpec::new("RWD", FacilityKind::Dam, 1000.0);
        spec.structure = Some(s1);
        b.add_facility(spec);
        let topo = b.build().unwrap();

        assert_eq!(topo.structure_by_code("S1").unwrap().id, s1);
        assert!(topo.structure_by_code("NOPE").is_err());
        assert_eq!(topo.get_structures(Some(a)).len(), 1);
        assert_eq!(topo.get_structures(None).len(), 2);
        assert_eq!(topo.area_of(s1).unwrap().code, "A");
        assert_eq!(topo.primary_facility_at(s1).unwrap().code, "RWD");
        assert_eq!(topo.facility_by_code("RWD").unwrap().structure, Some(s1));
    }

    #[test]
    fn duplicates_are_indexed_but_not_transfers() {
        let mut b = TopologyBuilder::new();
        let a = b.add_area("A", "A");
        let z = b.add_area("Z", "Z");
        let s1 = b.add_structure("S1", "S1", StructureKind::Dam, Some(a));
        let s2 = b.add_structure("S2", "S2", StructureKind::Dam, Some(z));
        let first = b.add_connection(ConnectionSpec::new(s1, s2, FlowType::Clean));
        let second = b.add_connection(ConnectionSpec::new(s1, s2, FlowType::Clean));
        let topo = b.build().unwrap();

        assert!(!topo.is_duplicate(first));
        assert!(topo.is_duplicate(second));
        assert_eq!(topo.get_inter_area_transfers().len(), 1);
        assert_eq!(topo.get_flow_connections(Some(s1)).len(), 2);
        assert_eq!(topo.duplicate_connections().count(), 1);
    }
}
