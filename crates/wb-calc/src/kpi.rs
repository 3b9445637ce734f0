//! Secondary metrics derived from a balance. Never fed back into closure.

use serde::Serialize;
use wb_core::{percent_of, CalculationPeriod};
use wb_topology::Topology;

use crate::providers::MeasurementProvider;
use crate::result::BalanceResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KpiInputs {
    pub fresh_in_m3: f64,
    pub recycled_m3: f64,
    pub total_outflows_m3: f64,
    pub ore_tonnes: Option<f64>,
    pub storage_open_m3: f64,
    pub storage_close_m3: f64,
    pub storage_capacity_m3: Option<f64>,
}

impl KpiInputs {
    /// Inputs from a computed balance. Fresh water is the site inflow total.
    pub fn from_balance(result: &BalanceResult, recycled_m3: f64, ore_tonnes: Option<f64>) -> Self {
        let capacity: f64 = result.storage.facilities.iter().map(|f| f.capacity_m3).sum();
        Self {
            fresh_in_m3: result.inflows.total_m3,
            recycled_m3,
            total_outflows_m3: result.outflows.total_m3,
            ore_tonnes,
            storage_open_m3: result.storage.opening_m3,
            storage_close_m3: result.storage.closing_m3,
            storage_capacity_m3: (capacity > 0.0).then_some(capacity),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KpiResult {
    /// recycled / (fresh + recycled) × 100.
    pub recycled_pct: f64,
    /// Outflow per tonne of ore, m³/t.
    pub intensity_m3_per_t: f64,
    pub storage_change_pct: f64,
    pub storage_utilisation_pct: Option<f64>,
}

pub fn compute(inputs: &KpiInputs) -> KpiResult {
    let moved = inputs.fresh_in_m3 + inputs.recycled_m3;
    let intensity = match inputs.ore_tonnes {
        Some(t) if t > 0.0 => inputs.total_outflows_m3 / t,
        _ => 0.0,
    };
    KpiResult {
        recycled_pct: percent_of(inputs.recycled_m3, moved),
        intensity_m3_per_t: intensity,
        storage_change_pct: percent_of(
            inputs.storage_close_m3 - inputs.storage_open_m3,
            inputs.storage_open_m3,
        ),
        storage_utilisation_pct: inputs
            .storage_capacity_m3
            .filter(|c| *c > 0.0)
            .map(|c| percent_of(inputs.storage_close_m3, c)),
    }
}

/// Metered volume of return flows in `period`.
///
/// Return flows are connections typed `ug_return` or sub-classified
/// `dam_return`; duplicates count once.
pub fn recycled_volume(
    topology: &Topology,
    measurements: &dyn MeasurementProvider,
    period: CalculationPeriod,
) -> f64 {
    topology
        .get_flow_connections(None)
        .into_iter()
        .filter(|c| c.is_return_flow() && !topology.is_duplicate(c.id))
        .filter_map(|c| {
            let from = topology.structure(c.from)?;
            let to = topology.structure(c.to)?;
            measurements.get_volume(period, &from.code, &to.code)
        })
        .sum()
}
