//! In-memory providers, used by frontends that hold a whole site in memory
//! and by tests.

use std::collections::HashMap;
use std::sync::Arc;

use wb_core::CalculationPeriod;
use wb_topology::{StorageFacility, Topology};

use crate::error::CalcResult;
use crate::providers::{MeasurementProvider, TopologyRepository};

/// A fixed topology snapshot.
#[derive(Debug, Clone)]
pub struct StaticTopology {
    topology: Arc<Topology>,
}

impl StaticTopology {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology: Arc::new(topology),
        }
    }
}

impl TopologyRepository for StaticTopology {
    fn load_topology(&self) -> CalcResult<Arc<Topology>> {
        Ok(Arc::clone(&self.topology))
    }

    fn get_storage_facilities(
        &self,
        active_only: bool,
        _use_cache: bool,
    ) -> CalcResult<Vec<StorageFacility>> {
        Ok(self
            .topology
            .get_storage_facilities(active_only)
            .into_iter()
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
struct PeriodData {
    rainfall_mm: Option<f64>,
    regional_evaporation_mm: Option<f64>,
    ore_tonnes: Option<f64>,
    flows: HashMap<(String, String), f64>,
    facility_evaporation_mm: HashMap<String, f64>,
    storage_volumes_m3: HashMap<String, f64>,
}

/// Measurements held in maps. Every setter bumps the revision.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMeasurements {
    periods: HashMap<CalculationPeriod, PeriodData>,
    revision: u64,
}

impl InMemoryMeasurements {
    pub fn new() -> Self {
        Self::default()
    }

    fn period_mut(&mut self, period: CalculationPeriod) -> &mut PeriodData {
        self.revision += 1;
        self.periods.entry(period).or_default()
    }

    fn period(&self, period: CalculationPeriod) -> Option<&PeriodData> {
        self.periods.get(&period)
    }

    fn lookup(&self, month: u32, year: i32) -> Option<&PeriodData> {
        CalculationPeriod::new(year, month)
            .ok()
            .and_then(|p| self.period(p))
    }

    pub fn set_rainfall(&mut self, period: CalculationPeriod, mm: f64) {
        self.period_mut(period).rainfall_mm = Some(mm);
    }

    pub fn set_regional_evaporation(&mut self, period: CalculationPeriod, mm: f64) {
        self.period_mut(period).regional_evaporation_mm = Some(mm);
    }

    pub fn set_ore_tonnes(&mut self, period: CalculationPeriod, tonnes: f64) {
        self.period_mut(period).ore_tonnes = Some(tonnes);
    }

    pub fn set_flow(&mut self, period: CalculationPeriod, from: &str, to: &str, volume_m3: f64) {
        self.period_mut(period)
            .flows
            .insert((from.to_string(), to.to_string()), volume_m3);
    }

    pub fn set_facility_evaporation(&mut self, period: CalculationPeriod, facility: &str, mm: f64) {
        self.period_mut(period)
            .facility_evaporation_mm
            .insert(facility.to_string(), mm);
    }

    pub fn set_storage_volume(&mut self, period: CalculationPeriod, facility: &str, volume_m3: f64) {
        self.period_mut(period)
            .storage_volumes_m3
            .insert(facility.to_string(), volume_m3);
    }

    pub fn clear_storage_volume(&mut self, period: CalculationPeriod, facility: &str) {
        self.period_mut(period).storage_volumes_m3.remove(facility);
    }
}

impl MeasurementProvider for InMemoryMeasurements {
    fn get_volume(&self, period: CalculationPeriod, from: &str, to: &str) -> Option<f64> {
        self.period(period)?
            .flows
            .get(&(from.to_string(), to.to_string()))
            .copied()
    }

    fn get_regional_evaporation_monthly(&self, month: u32, year: i32) -> Option<f64> {
        self.lookup(month, year)?.regional_evaporation_mm
    }

    fn get_facility_evaporation_monthly(
        &self,
        facility_code: &str,
        month: u32,
        year: i32,
    ) -> Option<f64> {
        self.lookup(month, year)?
            .facility_evaporation_mm
            .get(facility_code)
            .copied()
    }

    fn get_rainfall_monthly(&self, month: u32, year: i32) -> Option<f64> {
        self.lookup(month, year)?.rainfall_mm
    }

    fn get_storage_volume(&self, period: CalculationPeriod, facility_code: &str) -> Option<f64> {
        self.period(period)?
            .storage_volumes_m3
            .get(facility_code)
            .copied()
    }

    fn get_ore_tonnes(&self, period: CalculationPeriod) -> Option<f64> {
        self.period(period)?.ore_tonnes
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}
