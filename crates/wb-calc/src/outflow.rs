//! Outflow aggregation.

use std::collections::BTreeMap;

use tracing::debug;
use wb_core::CalculationPeriod;
use wb_topology::{OutflowDestination, Topology};

use crate::constants::BalanceConstants;
use crate::providers::MeasurementProvider;
use crate::quality::{DataQualityFlags, QualityFlag};
use crate::result::{Contribution, OutflowCategory, OutflowResult};
use crate::storage::StorageReconciler;
use crate::transfer::resolve_transfers;

/// Sums metered outflow destinations, facility evaporation and seepage, and
/// outbound inter-area transfers.
#[derive(Debug, Clone, Copy)]
pub struct OutflowAggregator {
    constants: BalanceConstants,
}

impl OutflowAggregator {
    pub fn new(constants: BalanceConstants) -> Self {
        Self { constants }
    }

    /// `storage` maps facility code to the volume losses are computed on;
    /// facilities missing from it use their current volume.
    pub fn compute(
        &self,
        period: CalculationPeriod,
        topology: &Topology,
        measurements: &dyn MeasurementProvider,
        storage: &BTreeMap<String, f64>,
        flags: &mut DataQualityFlags,
    ) -> OutflowResult {
        let mut result = OutflowResult::default();

        for destination in topology.outflow_destinations() {
            if let Some(item) = sentinel_outflow(destination, topology, measurements, period, flags) {
                result.add(item);
            }
        }

        let mut regional: Option<f64> = None;
        for facility in topology.get_storage_facilities(true) {
            if facility.is_tank() {
                continue;
            }
            let evaporation_mm = match measurements.get_facility_evaporation_monthly(
                &facility.code,
                period.month(),
                period.year(),
            ) {
                Some(v) => v,
                None => *regional.get_or_insert_with(|| {
                    self.regional_evaporation(measurements, period, flags)
                }),
            };
            let volume = storage
                .get(&facility.code)
                .copied()
                .unwrap_or(facility.current_volume_m3);
            let losses = StorageReconciler::losses(facility, volume, evaporation_mm, &self.constants, flags);

            let area = facility
                .structure
                .and_then(|s| topology.area_of(s))
                .map(|a| a.code.clone());
            if facility.open_surface_m2().is_some() {
                result.add(Contribution {
                    category: OutflowCategory::Evaporation,
                    area: area.clone(),
                    facility: Some(facility.code.clone()),
                    label: format!("evaporation from {}", facility.code),
                    volume_m3: losses.evaporation_m3,
                });
            }
            result.add(Contribution {
                category: OutflowCategory::Seepage,
                area,
                facility: Some(facility.code.clone()),
                label: format!("seepage from {}", facility.code),
                volume_m3: losses.seepage_m3,
            });
        }

        for t in resolve_transfers(topology, measurements, period, flags) {
            result.add(Contribution {
                category: OutflowCategory::TransferOut,
                label: t.label(),
                area: Some(t.from_area),
                facility: t.from_facility,
                volume_m3: t.volume_m3,
            });
        }

        debug!(
            period = %period,
            total_m3 = result.total_m3,
            transfer_m3 = result.transfer_m3,
            items = result.items.len(),
            "outflows aggregated"
        );
        result
    }

    fn regional_evaporation(
        &self,
        measurements: &dyn MeasurementProvider,
        period: CalculationPeriod,
        flags: &mut DataQualityFlags,
    ) -> f64 {
        match measurements.get_regional_evaporation_monthly(period.month(), period.year()) {
            Some(v) => v,
            None => {
                let fallback_mm = self.constants.default_evaporation_mm;
                flags.push(QualityFlag::MissingRegionalEvaporation { fallback_mm });
                fallback_mm
            }
        }
    }
}

fn sentinel_outflow(
    destination: &OutflowDestination,
    topology: &Topology,
    measurements: &dyn MeasurementProvider,
    period: CalculationPeriod,
    flags: &mut DataQualityFlags,
) -> Option<Contribution<OutflowCategory>> {
    let structure = topology.structure(destination.source)?;
    let area = topology.area_of(destination.source)?;
    let facility = topology.primary_facility_at(destination.source);
    if destination.kind.is_physical_loss() && facility.is_some() {
        // Derived from the facility's own attributes instead.
        return None;
    }

    let volume_m3 = match measurements.get_volume(period, &structure.code, &destination.code) {
        Some(v) => v,
        None => {
            flags.push(QualityFlag::MissingMeasurement {
                from: structure.code.clone(),
                to: destination.code.clone(),
            });
            0.0
        }
    };

    Some(Contribution {
        category: destination.kind.into(),
        area: Some(area.code.clone()),
        facility: facility.map(|f| f.code.clone()),
        label: format!("{} -> {}", structure.code, destination.code),
        volume_m3,
    })
}
