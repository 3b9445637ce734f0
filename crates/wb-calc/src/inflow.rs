//! Inflow aggregation.

use tracing::debug;
use wb_core::{as_m3, depth_over_area, m2, mm, CalculationPeriod};
use wb_topology::{InflowKind, InflowSource, Topology};

use crate::providers::MeasurementProvider;
use crate::quality::{DataQualityFlags, QualityFlag};
use crate::result::{Contribution, InflowCategory, InflowResult};
use crate::transfer::resolve_transfers;

/// Sums rainfall, metered inflow sources and inbound inter-area transfers.
#[derive(Debug, Clone, Copy, Default)]
pub struct InflowAggregator;

impl InflowAggregator {
    pub fn compute(
        &self,
        period: CalculationPeriod,
        topology: &Topology,
        measurements: &dyn MeasurementProvider,
        flags: &mut DataQualityFlags,
    ) -> InflowResult {
        let mut result = InflowResult::default();
        let mut rainfall = RainfallReading::new(measurements, period);

        for facility in topology.get_storage_facilities(true) {
            if !facility.kind.has_open_surface() {
                continue;
            }
            let Some(surface) = facility.open_surface_m2() else {
                flags.push(QualityFlag::ZeroSurfaceArea {
                    facility: facility.code.clone(),
                });
                continue;
            };
            let depth = rainfall.get(flags);
            result.add(Contribution {
                category: InflowCategory::Rainfall,
                area: facility
                    .structure
                    .and_then(|s| topology.area_of(s))
                    .map(|a| a.code.clone()),
                facility: Some(facility.code.clone()),
                label: format!("rainfall on {}", facility.code),
                volume_m3: as_m3(depth_over_area(mm(depth), m2(surface))),
            });
        }

        for source in topology.inflow_sources() {
            if let Some(item) = sentinel_inflow(source, topology, measurements, period, &mut rainfall, flags) {
                result.add(item);
            }
        }

        for t in resolve_transfers(topology, measurements, period, flags) {
            result.add(Contribution {
                category: InflowCategory::TransferIn,
                label: t.label(),
                area: Some(t.to_area),
                facility: t.to_facility,
                volume_m3: t.volume_m3,
            });
        }

        debug!(
            period = %period,
            total_m3 = result.total_m3,
            transfer_m3 = result.transfer_m3,
            items = result.items.len(),
            "inflows aggregated"
        );
        result
    }
}

/// Site rainfall, read once and flagged once when missing.
struct RainfallReading<'a> {
    measurements: &'a dyn MeasurementProvider,
    period: CalculationPeriod,
    value: Option<f64>,
}

impl<'a> RainfallReading<'a> {
    fn new(measurements: &'a dyn MeasurementProvider, period: CalculationPeriod) -> Self {
        Self {
            measurements,
            period,
            value: None,
        }
    }

    fn get(&mut self, flags: &mut DataQualityFlags) -> f64 {
        if let Some(v) = self.value {
            return v;
        }
        let v = match self
            .measurements
            .get_rainfall_monthly(self.period.month(), self.period.year())
        {
            Some(v) => v,
            None => {
                flags.push(QualityFlag::MissingRainfall);
                0.0
            }
        };
        self.value = Some(v);
        v
    }
}

fn sentinel_inflow(
    source: &InflowSource,
    topology: &Topology,
    measurements: &dyn MeasurementProvider,
    period: CalculationPeriod,
    rainfall: &mut RainfallReading<'_>,
    flags: &mut DataQualityFlags,
) -> Option<Contribution<InflowCategory>> {
    let structure = topology.structure(source.target)?;
    // Sentinels without an area are an integrity issue, reported elsewhere.
    let area = topology.area_of(source.target)?;
    let facility = topology.primary_facility_at(source.target);
    let label = format!("{} -> {}", source.code, structure.code);
    let metered = measurements.get_volume(period, &source.code, &structure.code);

    let volume_m3 = if source.kind == InflowKind::Rainfall {
        if facility.and_then(|f| f.open_surface_m2()).is_some() {
            // Already counted over the facility surface.
            return None;
        }
        match (metered, structure.catchment_area_m2.filter(|a| *a > 0.0)) {
            (Some(v), _) => v,
            (None, Some(catchment)) => {
                as_m3(depth_over_area(mm(rainfall.get(flags)), m2(catchment)))
            }
            (None, None) => {
                flags.push(QualityFlag::MissingCatchmentArea {
                    sentinel: source.code.clone(),
                    structure: structure.code.clone(),
                });
                0.0
            }
        }
    } else {
        match metered {
            Some(v) => v,
            None => {
                flags.push(QualityFlag::MissingMeasurement {
                    from: source.code.clone(),
                    to: structure.code.clone(),
                });
                0.0
            }
        }
    };

    Some(Contribution {
        category: source.kind.into(),
        area: Some(area.code.clone()),
        facility: facility.map(|f| f.code.clone()),
        label,
        volume_m3,
    })
}
