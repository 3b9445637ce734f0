//! Collaborator traits consumed by the engine.
//!
//! The topology store, the measurement source and the constants table live
//! outside this crate. Implementations must be cheap to query repeatedly; the
//! engine calls them once per period and does no caching of its own beyond
//! whole-period results.

use std::sync::Arc;

use wb_core::{AreaId, CalculationPeriod, StructureId};
use wb_topology::{
    Area, FlowConnection, InflowSource, InterAreaTransfer, OutflowDestination, StorageFacility,
    Structure, Topology,
};

use crate::error::CalcResult;

/// Read-only access to the site topology.
///
/// `load_topology` failing is fatal for a calculation. The remaining queries
/// default to views over the loaded snapshot.
pub trait TopologyRepository: Send {
    fn load_topology(&self) -> CalcResult<Arc<Topology>>;

    /// Storage facilities, optionally served from a cached list.
    fn get_storage_facilities(
        &self,
        active_only: bool,
        use_cache: bool,
    ) -> CalcResult<Vec<StorageFacility>>;

    fn get_areas(&self) -> CalcResult<Vec<Area>> {
        Ok(self.load_topology()?.get_areas().to_vec())
    }

    fn get_structures(&self, area: Option<AreaId>) -> CalcResult<Vec<Structure>> {
        let topology = self.load_topology()?;
        Ok(topology.get_structures(area).into_iter().cloned().collect())
    }

    fn get_flow_connections(&self, structure: Option<StructureId>) -> CalcResult<Vec<FlowConnection>> {
        let topology = self.load_topology()?;
        Ok(topology
            .get_flow_connections(structure)
            .into_iter()
            .cloned()
            .collect())
    }

    fn get_inflow_sources(&self, structure: StructureId) -> CalcResult<Vec<InflowSource>> {
        let topology = self.load_topology()?;
        Ok(topology
            .get_inflow_sources(structure)
            .into_iter()
            .cloned()
            .collect())
    }

    fn get_outflow_destinations(&self, structure: StructureId) -> CalcResult<Vec<OutflowDestination>> {
        let topology = self.load_topology()?;
        Ok(topology
            .get_outflow_destinations(structure)
            .into_iter()
            .cloned()
            .collect())
    }

    fn get_inter_area_transfers(&self) -> CalcResult<Vec<InterAreaTransfer>> {
        Ok(self.load_topology()?.get_inter_area_transfers().to_vec())
    }
}

/// Monthly measured series.
///
/// Every getter returns `None` for "not measured"; the aggregators decide the
/// fallback and flag it. Flow volumes are keyed by endpoint codes, which may
/// be structure codes or sentinel codes.
pub trait MeasurementProvider: Send {
    fn get_volume(&self, period: CalculationPeriod, from: &str, to: &str) -> Option<f64>;

    fn get_regional_evaporation_monthly(&self, month: u32, year: i32) -> Option<f64>;

    fn get_facility_evaporation_monthly(
        &self,
        facility_code: &str,
        month: u32,
        year: i32,
    ) -> Option<f64>;

    fn get_rainfall_monthly(&self, month: u32, year: i32) -> Option<f64>;

    /// Measured closing volume of a facility.
    fn get_storage_volume(&self, period: CalculationPeriod, facility_code: &str) -> Option<f64>;

    fn get_ore_tonnes(&self, period: CalculationPeriod) -> Option<f64>;

    /// Changes whenever any measured value changes.
    fn revision(&self) -> u64;
}

/// Named numeric constants with caller-supplied defaults.
pub trait ConstantsProvider: Send {
    fn get_constant(&self, name: &str, default: f64) -> f64;
}
