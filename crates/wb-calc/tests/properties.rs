use proptest::prelude::*;
use wb_calc::*;
use wb_core::CalculationPeriod;
use wb_results::InMemoryHistory;
use wb_topology::{
    ConnectionSpec, FacilityKind, FacilitySpec, FlowType, InflowKind, OutflowKind, StructureKind,
    Topology, TopologyBuilder,
};

fn facility_topology(kind: FacilityKind, surface_m2: f64, lined: Option<bool>) -> Topology {
    let mut b = TopologyBuilder::new();
    let a = b.add_area("A", "A");
    let s = b.add_structure(
        "S",
        "S",
        if kind == FacilityKind::Tank {
            StructureKind::Tank
        } else {
            StructureKind::Dam
        },
        Some(a),
    );
    let mut spec = FacilitySpec::new("F", kind, 1_000_000.0);
    spec.structure = Some(s);
    spec.surface_area_m2 = Some(surface_m2);
    spec.is_lined = lined;
    b.add_facility(spec);
    b.build().unwrap()
}

proptest! {
    #[test]
    fn evaporation_never_exceeds_volume(
        volume in 0.0f64..1e6,
        evaporation_mm in 0.0f64..2000.0,
        surface in 1.0f64..1e6,
    ) {
        let topology = facility_topology(FacilityKind::Dam, surface, Some(true));
        let facility = topology.facility_by_code("F").unwrap();
        let mut flags = DataQualityFlags::new();
        let losses = StorageReconciler::losses(
            facility,
            volume,
            evaporation_mm,
            &BalanceConstants::default(),
            &mut flags,
        );
        prop_assert!(losses.evaporation_m3 <= volume);
        prop_assert!(losses.evaporation_m3 >= 0.0);
        prop_assert_eq!(
            losses.evaporation_clamped(),
            flags.iter().any(|f| matches!(f, QualityFlag::EvaporationClamped { .. }))
        );
    }

    #[test]
    fn tanks_never_lose_water(
        volume in 0.0f64..1e6,
        evaporation_mm in 0.0f64..2000.0,
        surface in 0.0f64..1e6,
    ) {
        let topology = facility_topology(FacilityKind::Tank, surface, None);
        let facility = topology.facility_by_code("F").unwrap();
        let mut flags = DataQualityFlags::new();
        let losses = StorageReconciler::losses(
            facility,
            volume,
            evaporation_mm,
            &BalanceConstants::default(),
            &mut flags,
        );
        prop_assert_eq!(losses.total_m3(), 0.0);
        prop_assert!(flags.is_empty());
    }

    #[test]
    fn balance_identity_holds(
        borehole in proptest::option::of(0.0f64..50_000.0),
        consumption in proptest::option::of(0.0f64..50_000.0),
        rainfall in proptest::option::of(0.0f64..300.0),
        evaporation in proptest::option::of(0.0f64..400.0),
        closing in proptest::option::of(0.0f64..200_000.0),
        opening in 0.0f64..200_000.0,
    ) {
        let mut b = TopologyBuilder::new();
        let a = b.add_area("A", "A");
        let dam = b.add_structure("DAM", "Dam", StructureKind::Dam, Some(a));
        let plant = b.add_structure("PLANT", "Plant", StructureKind::Plant, Some(a));
        b.add_connection(ConnectionSpec::new(dam, plant, FlowType::Clean));
        b.add_inflow_source("BH", "Borehole", dam, InflowKind::Groundwater);
        b.add_outflow_destination("USE", "Use", plant, OutflowKind::Consumption);
        let mut spec = FacilitySpec::new("DAM", FacilityKind::Dam, 200_000.0);
        spec.structure = Some(dam);
        spec.surface_area_m2 = Some(25_000.0);
        spec.current_volume_m3 = opening;
        spec.is_lined = Some(false);
        b.add_facility(spec);

        let period = CalculationPeriod::new(2024, 2).unwrap();
        let mut m = InMemoryMeasurements::new();
        if let Some(v) = borehole { m.set_flow(period, "BH", "DAM", v); }
        if let Some(v) = consumption { m.set_flow(period, "PLANT", "USE", v); }
        if let Some(v) = rainfall { m.set_rainfall(period, v); }
        if let Some(v) = evaporation { m.set_regional_evaporation(period, v); }
        if let Some(v) = closing { m.set_storage_volume(period, "DAM", v); }

        let mut engine = BalanceEngine::new(
            Box::new(StaticTopology::new(b.build().unwrap())),
            Box::new(m),
            Box::new(StaticConstants::default()),
            Box::new(InMemoryHistory::new()),
        );
        let r = engine.calculate_for_date(2, 2024, false).unwrap();

        prop_assert_eq!(
            r.balance_error_m3,
            r.inflows.total_m3 - r.outflows.total_m3 - r.storage.delta_m3
        );
        prop_assert!(r.error_pct.is_finite());
        prop_assert!(r.storage.closing_m3 >= 0.0);
        if borehole.is_none() || consumption.is_none() || rainfall.is_none() {
            prop_assert!(r.quality.has_degraded());
            prop_assert_ne!(r.status, BalanceStatus::Closed);
        }
    }

    #[test]
    fn inter_area_transfers_are_symmetric(
        forward in proptest::option::of(0.0f64..10_000.0),
        reverse in proptest::option::of(0.0f64..10_000.0),
        one_way_first in any::<bool>(),
    ) {
        let mut b = TopologyBuilder::new();
        let north = b.add_area("N", "North");
        let south = b.add_area("S", "South");
        let n = b.add_structure("N-SUMP", "North sump", StructureKind::Sump, Some(north));
        let s = b.add_structure("S-DAM", "South dam", StructureKind::Dam, Some(south));
        // Extra connections over the same pair must not double-count, in either order.
        let dirty = ConnectionSpec::new(n, s, FlowType::Dirty).bidirectional();
        let storm = ConnectionSpec::new(n, s, FlowType::Stormwater);
        if one_way_first {
            b.add_connection(storm);
            b.add_connection(dirty);
        } else {
            b.add_connection(dirty);
            b.add_connection(storm);
        }

        let period = CalculationPeriod::new(2024, 11).unwrap();
        let mut m = InMemoryMeasurements::new();
        if let Some(v) = forward { m.set_flow(period, "N-SUMP", "S-DAM", v); }
        if let Some(v) = reverse { m.set_flow(period, "S-DAM", "N-SUMP", v); }

        let mut engine = BalanceEngine::new(
            Box::new(StaticTopology::new(b.build().unwrap())),
            Box::new(m),
            Box::new(StaticConstants::default()),
            Box::new(InMemoryHistory::new()),
        );
        let r = engine.calculate_for_date(11, 2024, false).unwrap();
        let n = r.area("N").unwrap();
        let s = r.area("S").unwrap();

        prop_assert_eq!(n.transfer_out_m3, s.transfer_in_m3);
        prop_assert_eq!(s.transfer_out_m3, n.transfer_in_m3);
        prop_assert_eq!(n.transfer_out_m3, forward.unwrap_or(0.0));
        prop_assert_eq!(n.transfer_in_m3, reverse.unwrap_or(0.0));
        prop_assert_eq!(r.inflows.total_m3, 0.0);
        prop_assert_eq!(r.outflows.total_m3, 0.0);
        prop_assert_eq!(r.inflows.transfer_m3, r.outflows.transfer_m3);
        let missing = r.quality.count(|f| matches!(f, QualityFlag::MissingMeasurement { .. }));
        prop_assert_eq!(missing, usize::from(forward.is_none() && reverse.is_none()));
    }
}
