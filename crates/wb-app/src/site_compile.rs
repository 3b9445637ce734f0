//! Compilation of a `SiteProject` into the calculation inputs.

use std::collections::HashMap;

use wb_calc::{EngineOptions, InMemoryMeasurements, StaticConstants};
use wb_core::{AreaId, CalculationPeriod, StructureId};
use wb_project::{EngineOptionsDef, SiteProject};
use wb_topology::{ConnectionSpec, FacilitySpec, Topology, TopologyBuilder};

use crate::error::{AppError, AppResult};

/// Build the immutable topology described by a site file.
pub fn compile_site(project: &SiteProject) -> AppResult<Topology> {
    let mut builder = TopologyBuilder::new();

    let mut areas: HashMap<&str, AreaId> = HashMap::new();
    for area in &project.areas {
        let id = builder.add_area(&area.code, &area.name);
        areas.insert(area.code.as_str(), id);
    }

    let mut structures: HashMap<&str, StructureId> = HashMap::new();
    for s in &project.structures {
        let area = match &s.area {
            Some(code) => Some(*areas.get(code.as_str()).ok_or_else(|| {
                AppError::Compile(format!("Structure '{}': area not found: {}", s.code, code))
            })?),
            None => None,
        };
        let id = builder.add_structure(&s.code, &s.name, s.kind, area);
        if let Some(m2) = s.catchment_area_m2 {
            builder.set_catchment_area(id, m2);
        }
        structures.insert(s.code.as_str(), id);
    }

    let lookup = |code: &str, owner: &str| -> AppResult<StructureId> {
        structures
            .get(code)
            .copied()
            .ok_or_else(|| AppError::Compile(format!("'{}': structure not found: {}", owner, code)))
    };

    for s in &project.structures {
        if let Some(parent) = &s.parent {
            builder.set_parent(lookup(&s.code, &s.code)?, lookup(parent, &s.code)?);
        }
    }

    for c in &project.connections {
        let owner = format!("{} -> {}", c.from, c.to);
        let mut spec = ConnectionSpec::new(lookup(&c.from, &owner)?, lookup(&c.to, &owner)?, c.flow_type)
            .subcategory(c.subcategory.clone());
        if c.bidirectional {
            spec = spec.bidirectional();
        }
        if let Some(internal) = c.internal {
            spec = spec.internal(internal);
        }
        if let Some(notes) = &c.notes {
            spec = spec.notes(notes.clone());
        }
        builder.add_connection(spec);
    }

    for src in &project.inflow_sources {
        builder.add_inflow_source(&src.code, &src.name, lookup(&src.target, &src.code)?, src.kind);
    }
    for dst in &project.outflow_destinations {
        builder.add_outflow_destination(&dst.code, &dst.name, lookup(&dst.source, &dst.code)?, dst.kind);
    }

    for f in &project.facilities {
        let mut spec = FacilitySpec::new(&f.code, f.kind, f.capacity_m3);
        spec.name = f.name.clone();
        spec.current_volume_m3 = f.current_volume_m3;
        spec.surface_area_m2 = f.surface_area_m2;
        spec.is_lined = f.is_lined;
        spec.active = f.active;
        spec.structure = match &f.structure {
            Some(code) => Some(lookup(code, &f.code)?),
            None => None,
        };
        builder.add_facility(spec);
    }

    Ok(builder.build()?)
}

/// Load every monthly record of the site into an in-memory provider.
pub fn measurements_for(project: &SiteProject) -> AppResult<InMemoryMeasurements> {
    let mut m = InMemoryMeasurements::new();
    for month in &project.measurements {
        let period = CalculationPeriod::new(month.year, month.month)?;
        if let Some(v) = month.rainfall_mm {
            m.set_rainfall(period, v);
        }
        if let Some(v) = month.regional_evaporation_mm {
            m.set_regional_evaporation(period, v);
        }
        if let Some(v) = month.ore_tonnes {
            m.set_ore_tonnes(period, v);
        }
        for flow in &month.flows {
            m.set_flow(period, &flow.from, &flow.to, flow.volume_m3);
        }
        for (facility, mm) in &month.facility_evaporation_mm {
            m.set_facility_evaporation(period, facility, *mm);
        }
        for (facility, v) in &month.storage_volumes_m3 {
            m.set_storage_volume(period, facility, *v);
        }
    }
    Ok(m)
}

pub fn constants_for(project: &SiteProject) -> StaticConstants {
    StaticConstants::new(project.constants.clone())
}

pub fn engine_options(def: &EngineOptionsDef) -> EngineOptions {
    EngineOptions {
        strict_topology: def.strict_topology,
        persist_history: def.persist_history,
        report_inactive_facilities: def.report_inactive_facilities,
    }
}
