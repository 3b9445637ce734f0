use std::sync::Arc;

use wb_calc::constants::LINED_SEEPAGE_RATE_PCT;
use wb_calc::*;
use wb_core::CalculationPeriod;
use wb_results::{HistorySource, InMemoryHistory, StorageHistoryStore};
use wb_topology::{
    ConnectionSpec, FacilityKind, FacilitySpec, FlowType, InflowKind, OutflowKind, StorageFacility,
    StructureKind, Topology, TopologyBuilder,
};

fn aug() -> CalculationPeriod {
    CalculationPeriod::new(2025, 8).unwrap()
}

/// One area, a borehole feeding the return water dam, consumption at the mill.
fn single_area_site() -> Topology {
    let mut b = TopologyBuilder::new();
    let plant = b.add_area("PLANT", "Concentrator");
    let rwd = b.add_structure("RWD", "Return Water Dam", StructureKind::Dam, Some(plant));
    let mill = b.add_structure("MILL", "Mill", StructureKind::Plant, Some(plant));
    b.add_connection(ConnectionSpec::new(rwd, mill, FlowType::Dirty));
    b.add_inflow_source("BH1", "Borehole 1", rwd, InflowKind::Groundwater);
    b.add_outflow_destination("CONS", "Mill consumption", mill, OutflowKind::Consumption);
    let mut dam = FacilitySpec::new("RWD", FacilityKind::Dam, 60_000.0);
    dam.structure = Some(rwd);
    dam.surface_area_m2 = Some(50_000.0);
    dam.current_volume_m3 = 10_000.0;
    dam.is_lined = Some(true);
    b.add_facility(dam);
    b.build().unwrap()
}

fn august_measurements() -> InMemoryMeasurements {
    let mut m = InMemoryMeasurements::new();
    m.set_rainfall(aug(), 0.0);
    m.set_regional_evaporation(aug(), 45.2);
    m.set_flow(aug(), "BH1", "RWD", 1000.0);
    m.set_flow(aug(), "MILL", "CONS", 800.0);
    m.set_flow(aug(), "RWD", "MILL", 800.0);
    m.set_storage_volume(aug(), "RWD", 7_940.0);
    m
}

fn engine(topology: Topology, measurements: InMemoryMeasurements) -> BalanceEngine {
    BalanceEngine::new(
        Box::new(StaticTopology::new(topology)),
        Box::new(measurements),
        Box::new(StaticConstants::default().with(LINED_SEEPAGE_RATE_PCT, 0.0)),
        Box::new(InMemoryHistory::new()),
    )
}

fn assert_identity(r: &BalanceResult) {
    assert_eq!(
        r.balance_error_m3,
        r.inflows.total_m3 - r.outflows.total_m3 - r.storage.delta_m3
    );
}

#[test]
fn single_area_scenario() {
    let mut engine = engine(single_area_site(), august_measurements());
    let r = engine.calculate_for_date(8, 2025, false).unwrap();

    assert_eq!(r.label, "August 2025");
    assert!((r.inflows.total_m3 - 1000.0).abs() < 1e-9);
    assert!((r.outflows.category(OutflowCategory::Evaporation) - 2260.0).abs() < 1e-9);
    assert_eq!(r.outflows.category(OutflowCategory::Seepage), 0.0);
    assert!((r.outflows.total_m3 - 3060.0).abs() < 1e-9);

    let rwd = r.storage.facility("RWD").unwrap();
    assert_eq!(rwd.opening_m3, 10_000.0);
    assert_eq!(rwd.opening_source, OpeningSource::Snapshot);
    assert_eq!(rwd.closing_m3, 7_940.0);
    assert_eq!(rwd.closing_source, HistorySource::Measured);
    assert_eq!(r.storage.delta_m3, -2_060.0);

    assert_identity(&r);
    assert!(r.balance_error_m3.abs() < 1e-6);
    assert_eq!(r.status, BalanceStatus::Closed);
    assert!(r
        .quality
        .iter()
        .any(|f| matches!(f, QualityFlag::NoPriorHistory { facility } if facility == "RWD")));
    assert!(r.integrity.is_empty());

    let plant = r.area("PLANT").unwrap();
    assert!((plant.balance_error_m3 - r.balance_error_m3).abs() < 1e-9);
}

#[test]
fn recalculation_is_idempotent_and_upserts_history() {
    let mut engine = engine(single_area_site(), august_measurements());
    assert_eq!(engine.period_state(aug()), PeriodState::NotComputed);

    let first = engine.calculate_for_date(8, 2025, false).unwrap();
    assert_eq!(engine.period_state(aug()), PeriodState::CachedValid);
    let cached = engine.calculate_for_date(8, 2025, false).unwrap();
    assert_eq!(first, cached);

    let forced = engine.calculate_for_date(8, 2025, true).unwrap();
    assert!(first.same_balance(&forced));

    let rows = engine.history().records().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].facility_code, "RWD");
    assert_eq!(rows[0].closing_m3, 7_940.0);
}

#[test]
fn next_month_opens_from_history_and_calculates_closing() {
    let mut m = august_measurements();
    let sep = aug().next();
    m.set_rainfall(sep, 0.0);
    m.set_regional_evaporation(sep, 20.0);
    m.set_flow(sep, "BH1", "RWD", 1000.0);
    m.set_flow(sep, "MILL", "CONS", 800.0);
    m.set_flow(sep, "RWD", "MILL", 800.0);
    let mut engine = engine(single_area_site(), m);

    engine.calculate_for_date(8, 2025, false).unwrap();
    let r = engine.calculate_for_date(9, 2025, false).unwrap();

    let rwd = r.storage.facility("RWD").unwrap();
    assert_eq!(rwd.opening_source, OpeningSource::History);
    assert_eq!(rwd.opening_m3, 7_940.0);
    assert_eq!(rwd.closing_source, HistorySource::Calculated);
    // +1000 borehole, -1000 evaporation (20 mm over 50 000 m2), -800 to the mill.
    assert!((rwd.closing_m3 - 7_140.0).abs() < 1e-9);
    assert!(!r
        .quality
        .iter()
        .any(|f| matches!(f, QualityFlag::NoPriorHistory { .. })));
    assert_identity(&r);
}

#[test]
fn skipped_month_is_carried_forward_with_a_gap_flag() {
    let mut engine = engine(single_area_site(), august_measurements());
    engine.calculate_for_date(8, 2025, false).unwrap();
    let october = engine.calculate_for_date(10, 2025, false).unwrap();

    let rwd = october.storage.facility("RWD").unwrap();
    assert_eq!(rwd.opening_source, OpeningSource::CarriedForward);
    assert_eq!(rwd.opening_m3, 7_940.0);
    assert!(october.quality.iter().any(|f| matches!(
        f,
        QualityFlag::HistoryGap { facility, from_period } if facility == "RWD" && from_period == "2025-08"
    )));
    assert!(october.quality.has_degraded());
    assert_ne!(october.status, BalanceStatus::Closed);
}

#[test]
fn recomputing_a_period_marks_later_periods_stale() {
    let mut engine = engine(single_area_site(), august_measurements());
    engine.calculate_for_date(9, 2025, false).unwrap();
    engine.calculate_for_date(8, 2025, false).unwrap();
    assert_eq!(engine.period_state(aug()), PeriodState::CachedValid);
    assert_eq!(engine.period_state(aug().next()), PeriodState::Stale);

    engine.invalidate_period(aug());
    assert_eq!(engine.period_state(aug()), PeriodState::Stale);
    assert!(engine.cached(aug()).is_none());
}

#[test]
fn measurement_change_invalidates_cache() {
    let mut engine = engine(single_area_site(), august_measurements());
    let before = engine.calculate_for_date(8, 2025, false).unwrap();

    let mut changed = august_measurements();
    changed.set_flow(aug(), "BH1", "RWD", 1500.0);
    engine.set_measurements(Box::new(changed));
    assert_eq!(engine.period_state(aug()), PeriodState::Stale);

    let after = engine.calculate_for_date(8, 2025, false).unwrap();
    assert!((after.inflows.total_m3 - 1500.0).abs() < 1e-9);
    assert_ne!(before.fingerprint, after.fingerprint);
}

#[test]
fn missing_measurements_degrade_but_still_produce_a_result() {
    let mut engine = engine(single_area_site(), InMemoryMeasurements::new());
    let r = engine.calculate_for_date(8, 2025, false).unwrap();

    assert_eq!(r.inflows.total_m3, 0.0);
    assert!(r.quality.has_degraded());
    assert_ne!(r.status, BalanceStatus::Closed);
    assert!(r.error_pct.is_finite());
    assert_identity(&r);
}

#[test]
fn invalid_period_is_fatal() {
    let mut engine = engine(single_area_site(), august_measurements());
    assert!(matches!(
        engine.calculate_for_date(13, 2025, false),
        Err(CalcError::Core(_))
    ));
}

fn two_area_site(bidirectional: bool) -> Topology {
    let mut b = TopologyBuilder::new();
    let ug = b.add_area("UG", "Underground");
    let plant = b.add_area("PLANT", "Plant");
    let sump = b.add_structure("SUMP", "Main sump", StructureKind::Sump, Some(ug));
    let rwd = b.add_structure("RWD", "RWD", StructureKind::Dam, Some(plant));
    let spec = ConnectionSpec::new(sump, rwd, FlowType::Dirty);
    b.add_connection(if bidirectional { spec.bidirectional() } else { spec });
    b.add_inflow_source("FISSURE", "Fissure water", sump, InflowKind::Groundwater);
    b.build().unwrap()
}

#[test]
fn strict_topology_rejects_policy_violations() {
    let mut m = InMemoryMeasurements::new();
    m.set_flow(aug(), "SUMP", "RWD", 400.0);
    let mut strict = engine(two_area_site(false), m.clone()).with_options(EngineOptions {
        strict_topology: true,
        ..Default::default()
    });
    assert!(matches!(
        strict.calculate_for_date(8, 2025, false),
        Err(CalcError::PolicyViolation { count: 1, .. })
    ));
    assert_eq!(strict.period_state(aug()), PeriodState::NotComputed);

    let mut lenient = engine(two_area_site(false), m);
    let r = lenient.calculate_for_date(8, 2025, false).unwrap();
    assert_eq!(r.integrity.len(), 1);
}

#[test]
fn transfers_are_booked_once_per_side() {
    let mut m = InMemoryMeasurements::new();
    m.set_flow(aug(), "FISSURE", "SUMP", 500.0);
    m.set_flow(aug(), "SUMP", "RWD", 400.0);
    m.set_flow(aug(), "RWD", "SUMP", 50.0);
    let mut engine = engine(two_area_site(true), m);
    let r = engine.calculate_for_date(8, 2025, false).unwrap();

    let ug = r.area("UG").unwrap();
    let plant = r.area("PLANT").unwrap();
    assert_eq!(ug.transfer_out_m3, 400.0);
    assert_eq!(ug.transfer_in_m3, 50.0);
    assert_eq!(plant.transfer_in_m3, 400.0);
    assert_eq!(plant.transfer_out_m3, 50.0);
    assert_eq!(r.inflows.total_m3, 500.0);
    assert_eq!(r.outflows.total_m3, 0.0);
    assert_eq!(r.inflows.transfer_m3, r.outflows.transfer_m3);
}

#[test]
fn reverse_transfer_survives_a_one_way_connection_listed_first() {
    let mut b = TopologyBuilder::new();
    let ug = b.add_area("UG", "Underground");
    let plant = b.add_area("PLANT", "Plant");
    let sump = b.add_structure("SUMP", "Main sump", StructureKind::Sump, Some(ug));
    let rwd = b.add_structure("RWD", "RWD", StructureKind::Dam, Some(plant));
    b.add_connection(ConnectionSpec::new(sump, rwd, FlowType::Stormwater));
    b.add_connection(ConnectionSpec::new(sump, rwd, FlowType::Dirty).bidirectional());

    let mut m = InMemoryMeasurements::new();
    m.set_flow(aug(), "SUMP", "RWD", 400.0);
    m.set_flow(aug(), "RWD", "SUMP", 50.0);
    let mut engine = engine(b.build().unwrap(), m);
    let r = engine.calculate_for_date(8, 2025, false).unwrap();

    let ug = r.area("UG").unwrap();
    let plant = r.area("PLANT").unwrap();
    assert_eq!(ug.transfer_out_m3, 400.0);
    assert_eq!(ug.transfer_in_m3, 50.0);
    assert_eq!(plant.transfer_in_m3, 400.0);
    assert_eq!(plant.transfer_out_m3, 50.0);
    assert_eq!(r.quality.count(|f| matches!(f, QualityFlag::MissingMeasurement { .. })), 0);
}

#[test]
fn second_internal_connection_does_not_flag_a_measured_move() {
    let mut b = TopologyBuilder::new();
    let plant = b.add_area("PLANT", "Plant");
    let d1 = b.add_structure("D1", "Tank 1", StructureKind::Tank, Some(plant));
    let d2 = b.add_structure("D2", "Tank 2", StructureKind::Tank, Some(plant));
    b.add_connection(ConnectionSpec::new(d1, d2, FlowType::Clean));
    b.add_connection(ConnectionSpec::new(d1, d2, FlowType::Dirty));
    for (code, structure, volume) in [("D1", d1, 1_000.0), ("D2", d2, 500.0)] {
        let mut tank = FacilitySpec::new(code, FacilityKind::Tank, 5_000.0);
        tank.structure = Some(structure);
        tank.current_volume_m3 = volume;
        b.add_facility(tank);
    }

    let mut m = InMemoryMeasurements::new();
    m.set_rainfall(aug(), 0.0);
    m.set_regional_evaporation(aug(), 0.0);
    m.set_flow(aug(), "D1", "D2", 100.0);
    let mut engine = engine(b.build().unwrap(), m);
    let r = engine.calculate_for_date(8, 2025, false).unwrap();

    assert_eq!(r.quality.count(|f| matches!(f, QualityFlag::MissingMeasurement { .. })), 0);
    assert!(!r.quality.has_degraded(), "{:?}", r.quality);
    assert_eq!(r.status, BalanceStatus::Closed);
    assert_eq!(r.storage.facility("D1").unwrap().closing_m3, 900.0);
    assert_eq!(r.storage.facility("D2").unwrap().closing_m3, 600.0);
}

struct Unavailable;

impl TopologyRepository for Unavailable {
    fn load_topology(&self) -> CalcResult<Arc<Topology>> {
        Err(CalcError::TopologyUnavailable {
            what: "database locked".into(),
        })
    }

    fn get_storage_facilities(&self, _: bool, _: bool) -> CalcResult<Vec<StorageFacility>> {
        Err(CalcError::TopologyUnavailable {
            what: "database locked".into(),
        })
    }
}

#[test]
fn unavailable_topology_is_fatal() {
    let mut engine = BalanceEngine::new(
        Box::new(Unavailable),
        Box::new(InMemoryMeasurements::new()),
        Box::new(StaticConstants::default()),
        Box::new(InMemoryHistory::new()),
    );
    assert!(matches!(
        engine.calculate_for_date(8, 2025, false),
        Err(CalcError::TopologyUnavailable { .. })
    ));
    assert!(engine.history().records().unwrap().is_empty());
}

#[test]
fn kpis_from_balance() {
    let mut b = TopologyBuilder::new();
    let plant = b.add_area("PLANT", "Plant");
    let rwd = b.add_structure("RWD", "RWD", StructureKind::Dam, Some(plant));
    let mill = b.add_structure("MILL", "Mill", StructureKind::Plant, Some(plant));
    b.add_connection(ConnectionSpec::new(mill, rwd, FlowType::Dirty).subcategory("dam_return"));
    b.add_inflow_source("BH1", "Borehole", rwd, InflowKind::Groundwater);
    let topology = b.build().unwrap();

    let mut m = InMemoryMeasurements::new();
    m.set_flow(aug(), "BH1", "RWD", 750.0);
    m.set_flow(aug(), "MILL", "RWD", 250.0);
    m.set_ore_tonnes(aug(), 50_000.0);

    let recycled = kpi::recycled_volume(&topology, &m, aug());
    assert_eq!(recycled, 250.0);

    let mut engine = engine(topology, m.clone());
    let r = engine.calculate_for_date(8, 2025, false).unwrap();
    let inputs = KpiInputs::from_balance(&r, recycled, m.get_ore_tonnes(aug()));
    let k = kpi::compute(&inputs);
    assert!((k.recycled_pct - 25.0).abs() < 1e-12);
    assert_eq!(k.intensity_m3_per_t, 0.0);
}
