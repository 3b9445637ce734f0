//! Storage reconciliation and facility loss physics.
//!
//! Openings come from storage history, closings from measured levels or from
//! the opening plus the calculated net flow. Evaporation and seepage are
//! derived here from facility attributes so that the outflow aggregator and
//! the reconciler agree on them.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};
use wb_core::{
    as_m3, depth_over_area, fraction_of, m2, m3, mm, percent, percent_of, CalculationPeriod,
    StructureId,
};
use wb_results::{HistorySource, StorageHistoryRecord, StorageHistoryStore};
use wb_topology::{StorageFacility, Topology};

use crate::constants::BalanceConstants;
use crate::error::CalcResult;
use crate::providers::MeasurementProvider;
use crate::quality::{DataQualityFlags, QualityFlag};
use crate::result::{FacilityStorage, InflowResult, OpeningSource, OutflowResult, StorageChange};
use crate::transfer::read_pairs;

/// Monthly losses of one facility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FacilityLosses {
    /// Evaporation before clamping to the available volume.
    pub requested_evaporation_m3: f64,
    pub evaporation_m3: f64,
    pub seepage_m3: f64,
}

impl FacilityLosses {
    pub fn total_m3(&self) -> f64 {
        self.evaporation_m3 + self.seepage_m3
    }

    pub fn evaporation_clamped(&self) -> bool {
        self.evaporation_m3 < self.requested_evaporation_m3
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Opening {
    pub volume_m3: f64,
    pub source: OpeningSource,
}

#[derive(Debug, Clone)]
pub struct StorageReconciler {
    constants: BalanceConstants,
    include_inactive: bool,
}

impl StorageReconciler {
    pub fn new(constants: BalanceConstants) -> Self {
        Self {
            constants,
            include_inactive: false,
        }
    }

    /// Also report inactive facilities, outside the totals.
    pub fn include_inactive(mut self, include: bool) -> Self {
        self.include_inactive = include;
        self
    }

    /// Evaporation and seepage for a facility currently holding `volume_m3`.
    ///
    /// Evaporation never exceeds the volume. Seepage is a fixed share of the
    /// volume and is not clamped; when both together exceed the volume the
    /// result is flagged. Tanks lose nothing.
    pub fn losses(
        facility: &StorageFacility,
        volume_m3: f64,
        evaporation_mm: f64,
        constants: &BalanceConstants,
        flags: &mut DataQualityFlags,
    ) -> FacilityLosses {
        if facility.is_tank() {
            return FacilityLosses::default();
        }
        let volume_m3 = volume_m3.max(0.0);

        let requested = match facility.open_surface_m2() {
            Some(surface) => as_m3(depth_over_area(mm(evaporation_mm.max(0.0)), m2(surface))),
            None => {
                flags.push(QualityFlag::ZeroSurfaceArea {
                    facility: facility.code.clone(),
                });
                0.0
            }
        };
        let evaporation = requested.min(volume_m3);
        if requested > volume_m3 {
            warn!(
                facility = %facility.code,
                requested_m3 = requested,
                volume_m3,
                "evaporation clamped to available volume"
            );
            flags.push(QualityFlag::EvaporationClamped {
                facility: facility.code.clone(),
                requested_m3: requested,
                clamped_m3: evaporation,
            });
        }

        let lined = match facility.is_lined {
            Some(lined) => lined,
            None => {
                flags.push(QualityFlag::MissingLiningClassification {
                    facility: facility.code.clone(),
                });
                false
            }
        };
        let rate = constants.seepage_rate_pct(lined);
        let seepage = as_m3(fraction_of(m3(volume_m3), percent(rate)));

        let losses = FacilityLosses {
            requested_evaporation_m3: requested,
            evaporation_m3: evaporation,
            seepage_m3: seepage,
        };
        if losses.total_m3() > volume_m3 {
            flags.push(QualityFlag::LossesExceedVolume {
                facility: facility.code.clone(),
                losses_m3: losses.total_m3(),
                volume_m3,
            });
        }
        losses
    }

    fn considered<'a>(&self, facilities: &'a [StorageFacility]) -> impl Iterator<Item = &'a StorageFacility> {
        let include_inactive = self.include_inactive;
        facilities
            .iter()
            .filter(move |f| f.active || include_inactive)
    }

    /// Opening volume per facility code.
    ///
    /// Prior month's closing from history, else the measured level of the
    /// previous month, else the latest older closing (flagged as a gap), else
    /// the facility's current volume.
    pub fn openings(
        &self,
        period: CalculationPeriod,
        facilities: &[StorageFacility],
        history: &dyn StorageHistoryStore,
        measurements: &dyn MeasurementProvider,
        flags: &mut DataQualityFlags,
    ) -> CalcResult<BTreeMap<String, Opening>> {
        let mut openings = BTreeMap::new();
        for facility in self.considered(facilities) {
            let code = &facility.code;
            let opening = if let Some(volume_m3) = history.prior_closing(code, period)? {
                Opening {
                    volume_m3,
                    source: OpeningSource::History,
                }
            } else if let Some(volume_m3) = measurements.get_storage_volume(period.previous(), code) {
                if facility.active {
                    flags.push(QualityFlag::NoPriorHistory {
                        facility: code.clone(),
                    });
                }
                Opening {
                    volume_m3,
                    source: OpeningSource::MeasuredPrior,
                }
            } else if let Some(older) = history.latest_before(code, period)? {
                if facility.active {
                    flags.push(QualityFlag::HistoryGap {
                        facility: code.clone(),
                        from_period: format!("{}-{:02}", older.year, older.month),
                    });
                }
                Opening {
                    volume_m3: older.closing_m3,
                    source: OpeningSource::CarriedForward,
                }
            } else {
                if facility.active {
                    flags.push(QualityFlag::NoPriorHistory {
                        facility: code.clone(),
                    });
                }
                Opening {
                    volume_m3: facility.current_volume_m3,
                    source: OpeningSource::Snapshot,
                }
            };
            openings.insert(code.clone(), opening);
        }
        Ok(openings)
    }

    /// Reconcile closings against openings for every considered facility.
    ///
    /// `net_flows` holds the calculated net inflow per facility code; it is
    /// only used where no closing level was measured.
    pub fn compute(
        &self,
        period: CalculationPeriod,
        topology: &Topology,
        facilities: &[StorageFacility],
        openings: &BTreeMap<String, Opening>,
        net_flows: &BTreeMap<String, f64>,
        measurements: &dyn MeasurementProvider,
        flags: &mut DataQualityFlags,
    ) -> StorageChange {
        let mut change = StorageChange::default();
        for facility in self.considered(facilities) {
            let mut local = DataQualityFlags::new();
            let opening = openings.get(&facility.code).copied().unwrap_or(Opening {
                volume_m3: facility.current_volume_m3,
                source: OpeningSource::Snapshot,
            });
            let net_flow_m3 = net_flows.get(&facility.code).copied().unwrap_or(0.0);

            let (raw, closing_source) = match measurements.get_storage_volume(period, &facility.code) {
                Some(level) => (level, HistorySource::Measured),
                None => (opening.volume_m3 + net_flow_m3, HistorySource::Calculated),
            };
            let closing = if raw < 0.0 {
                warn!(facility = %facility.code, raw_m3 = raw, "closing volume clamped to zero");
                local.push(QualityFlag::NegativeCalculatedVolume {
                    facility: facility.code.clone(),
                    raw_m3: raw,
                });
                0.0
            } else {
                raw
            };

            if facility.capacity_m3 > 0.0 {
                if closing > facility.capacity_m3 {
                    local.push(QualityFlag::CapacityExceeded {
                        facility: facility.code.clone(),
                        closing_m3: closing,
                        capacity_m3: facility.capacity_m3,
                    });
                }
                let reserve = facility.capacity_m3 * self.constants.minimum_reserve_pct / 100.0;
                if closing < reserve {
                    local.push(QualityFlag::BelowMinimumReserve {
                        facility: facility.code.clone(),
                        closing_m3: closing,
                        reserve_m3: reserve,
                    });
                }
            }

            let row = FacilityStorage {
                code: facility.code.clone(),
                name: facility.name.clone(),
                kind: facility.kind,
                area: facility
                    .structure
                    .and_then(|s| topology.area_of(s))
                    .map(|a| a.code.clone()),
                active: facility.active,
                capacity_m3: facility.capacity_m3,
                opening_m3: opening.volume_m3,
                closing_m3: closing,
                delta_m3: closing - opening.volume_m3,
                opening_source: opening.source,
                closing_source,
                net_flow_m3,
                utilisation_pct: percent_of(closing, facility.capacity_m3),
            };

            if facility.active {
                flags.extend(local);
                change.opening_m3 += row.opening_m3;
                change.closing_m3 += row.closing_m3;
                change.facilities.push(row);
            } else {
                change.inactive.push(row);
            }
        }
        change.delta_m3 = change.closing_m3 - change.opening_m3;
        debug!(
            period = %period,
            opening_m3 = change.opening_m3,
            closing_m3 = change.closing_m3,
            "storage reconciled"
        );
        change
    }

    /// History rows for the active facilities of a reconciled period.
    pub fn history_records(period: CalculationPeriod, change: &StorageChange) -> Vec<StorageHistoryRecord> {
        change
            .facilities
            .iter()
            .map(|f| {
                StorageHistoryRecord::new(
                    f.code.clone(),
                    period,
                    f.opening_m3,
                    f.closing_m3,
                    f.closing_source,
                )
            })
            .collect()
    }

    /// Upsert the period's rows in one commit.
    pub fn persist(
        &self,
        period: CalculationPeriod,
        change: &StorageChange,
        history: &mut dyn StorageHistoryStore,
    ) -> CalcResult<()> {
        let records = Self::history_records(period, change);
        history.upsert_period(period, &records)?;
        debug!(period = %period, rows = records.len(), "storage history committed");
        Ok(())
    }
}

/// Measured flows between facilities inside one area.
///
/// These never reach the area totals but they do move water between
/// facilities, so they feed the calculated closing volumes.
pub fn internal_moves(
    topology: &Topology,
    measurements: &dyn MeasurementProvider,
    period: CalculationPeriod,
    flags: &mut DataQualityFlags,
) -> BTreeMap<String, f64> {
    let links = topology
        .get_flow_connections(None)
        .into_iter()
        .filter(|c| c.internal && !topology.is_duplicate(c.id) && c.from != c.to)
        .filter(|c| {
            topology.primary_facility_at(c.from).is_some() || topology.primary_facility_at(c.to).is_some()
        })
        .map(|c| (c.from, c.to, c.bidirectional));
    let code = |id: StructureId| topology.structure(id).map(|s| s.code.clone()).unwrap_or_default();
    let pairs = read_pairs(links, |a, b| measurements.get_volume(period, &code(a), &code(b)));

    let mut moves = BTreeMap::new();
    for pair in pairs {
        for d in pair.missing() {
            flags.push(QualityFlag::MissingMeasurement {
                from: code(d.from),
                to: code(d.to),
            });
        }
        for (d, volume_m3) in pair.measured() {
            if let Some(f) = topology.primary_facility_at(d.from) {
                *moves.entry(f.code.clone()).or_insert(0.0) -= volume_m3;
            }
            if let Some(f) = topology.primary_facility_at(d.to) {
                *moves.entry(f.code.clone()).or_insert(0.0) += volume_m3;
            }
        }
    }
    moves
}

/// Net calculated inflow per facility: attributed inflows minus attributed
/// outflows plus internal moves.
pub fn net_flows(
    inflows: &InflowResult,
    outflows: &OutflowResult,
    moves: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    let mut net = inflows.by_facility();
    for (code, out) in outflows.by_facility() {
        *net.entry(code).or_insert(0.0) -= out;
    }
    for (code, moved) in moves {
        *net.entry(code.clone()).or_insert(0.0) += moved;
    }
    net
}

#[cfg(test)]
mod tests {
    use super::*;
    use wb_core::Id;
    use wb_topology::FacilityKind;

    fn dam(lined: Option<bool>, surface: Option<f64>) -> StorageFacility {
        StorageFacility {
            id: Id::from_index(0),
            code: "RWD".into(),
            name: "Return Water Dam".into(),
            kind: FacilityKind::Dam,
            capacity_m3: 100_000.0,
            current_volume_m3: 10_000.0,
            surface_area_m2: surface,
            is_lined: lined,
            active: true,
            structure: None,
        }
    }

    #[test]
    fn evaporation_over_surface() {
        let mut flags = DataQualityFlags::new();
        let c = BalanceConstants {
            lined_seepage_rate_pct: 0.0,
            ..Default::default()
        };
        let l = StorageReconciler::losses(&dam(Some(true), Some(50_000.0)), 10_000.0, 45.2, &c, &mut flags);
        assert!((l.evaporation_m3 - 2260.0).abs() < 1e-9);
        assert_eq!(l.seepage_m3, 0.0);
        assert!(flags.is_empty());
    }

    #[test]
    fn evaporation_is_clamped_to_volume() {
        let mut flags = DataQualityFlags::new();
        let l = StorageReconciler::losses(
            &dam(Some(true), Some(50_000.0)),
            1_000.0,
            45.2,
            &BalanceConstants::default(),
            &mut flags,
        );
        assert_eq!(l.evaporation_m3, 1_000.0);
        assert!(l.evaporation_clamped());
        assert_eq!(flags.count(|f| matches!(f, QualityFlag::EvaporationClamped { .. })), 1);
        assert_eq!(flags.count(|f| matches!(f, QualityFlag::LossesExceedVolume { .. })), 1);
    }

    #[test]
    fn unknown_lining_uses_unlined_rate() {
        let mut flags = DataQualityFlags::new();
        let l = StorageReconciler::losses(
            &dam(None, Some(1.0)),
            10_000.0,
            0.0,
            &BalanceConstants::default(),
            &mut flags,
        );
        assert!((l.seepage_m3 - 50.0).abs() < 1e-9);
        assert!(flags
            .iter()
            .any(|f| matches!(f, QualityFlag::MissingLiningClassification { .. })));
    }

    #[test]
    fn missing_surface_skips_evaporation() {
        let mut flags = DataQualityFlags::new();
        let l = StorageReconciler::losses(
            &dam(Some(false), None),
            10_000.0,
            100.0,
            &BalanceConstants::default(),
            &mut flags,
        );
        assert_eq!(l.evaporation_m3, 0.0);
        assert!((l.seepage_m3 - 50.0).abs() < 1e-9);
        assert!(flags.iter().any(|f| matches!(f, QualityFlag::ZeroSurfaceArea { .. })));
    }

    #[test]
    fn tank_loses_nothing() {
        let mut tank = dam(None, Some(500.0));
        tank.kind = FacilityKind::Tank;
        let mut flags = DataQualityFlags::new();
        let l = StorageReconciler::losses(&tank, 10_000.0, 200.0, &BalanceConstants::default(), &mut flags);
        assert_eq!(l, FacilityLosses::default());
        assert!(flags.is_empty());
    }
}
