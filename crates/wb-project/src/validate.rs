//! Site file validation logic.
//!
//! Structural problems are rejected here, at the ingestion boundary. House-rule
//! violations (dirty transfers, tank lining, duplicate connections) are left to
//! the topology integrity pass so they can be reported alongside results.

use std::collections::HashSet;

use wb_core::CalculationPeriod;
use wb_topology::StructureKind;

use crate::schema::{MonthlyMeasurementsDef, SiteProject};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

pub fn validate_project(project: &SiteProject) -> Result<(), ValidationError> {
    if project.version > crate::migrate::LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: project.version,
        });
    }

    for (name, value) in &project.constants {
        check_finite(&format!("constants.{}", name), *value)?;
    }

    let area_codes = unique_codes(project.areas.iter().map(|a| &a.code), "areas")?;
    let structure_codes = unique_codes(project.structures.iter().map(|s| &s.code), "structures")?;
    let facility_codes = unique_codes(project.facilities.iter().map(|f| &f.code), "facilities")?;
    let sentinel_codes = unique_codes(
        project
            .inflow_sources
            .iter()
            .map(|s| &s.code)
            .chain(project.outflow_destinations.iter().map(|d| &d.code)),
        "sentinels",
    )?;

    for structure in &project.structures {
        match &structure.area {
            Some(area) => check_ref(area, &area_codes, "structure area")?,
            None if structure.kind != StructureKind::Group => {
                return Err(ValidationError::MissingReference {
                    id: structure.code.clone(),
                    context: "area of non-group structure".to_string(),
                });
            }
            None => {}
        }
        if let Some(parent) = &structure.parent {
            check_ref(parent, &structure_codes, "structure parent")?;
        }
        if let Some(catchment) = structure.catchment_area_m2 {
            check_non_negative(&format!("{}.catchment_area_m2", structure.code), catchment)?;
        }
    }

    for connection in &project.connections {
        check_ref(&connection.from, &structure_codes, "connection from")?;
        check_ref(&connection.to, &structure_codes, "connection to")?;
    }

    for source in &project.inflow_sources {
        check_ref(&source.target, &structure_codes, "inflow source target")?;
    }
    for destination in &project.outflow_destinations {
        check_ref(&destination.source, &structure_codes, "outflow destination source")?;
    }

    for facility in &project.facilities {
        let field = |name: &str| format!("{}.{}", facility.code, name);
        check_non_negative(&field("capacity_m3"), facility.capacity_m3)?;
        check_non_negative(&field("current_volume_m3"), facility.current_volume_m3)?;
        if let Some(surface) = facility.surface_area_m2 {
            check_non_negative(&field("surface_area_m2"), surface)?;
        }
        if let Some(structure) = &facility.structure {
            check_ref(structure, &structure_codes, "facility structure")?;
        }
    }

    let flow_nodes: HashSet<&String> = structure_codes.union(&sentinel_codes).copied().collect();
    let mut periods = HashSet::new();
    for monthly in &project.measurements {
        let period = CalculationPeriod::new(monthly.year, monthly.month).map_err(|e| {
            ValidationError::InvalidValue {
                field: "measurements.month".to_string(),
                value: format!("{}-{}", monthly.year, monthly.month),
                reason: e.to_string(),
            }
        })?;
        if !periods.insert(period) {
            return Err(ValidationError::DuplicateId {
                id: period.to_string(),
                context: "measurements".to_string(),
            });
        }
        validate_monthly(monthly, &flow_nodes, &facility_codes)?;
    }

    Ok(())
}

fn validate_monthly(
    monthly: &MonthlyMeasurementsDef,
    flow_nodes: &HashSet<&String>,
    facility_codes: &HashSet<&String>,
) -> Result<(), ValidationError> {
    let tag = format!("{}-{:02}", monthly.year, monthly.month);
    for (field, value) in [
        ("rainfall_mm", monthly.rainfall_mm),
        ("regional_evaporation_mm", monthly.regional_evaporation_mm),
        ("ore_tonnes", monthly.ore_tonnes),
    ] {
        if let Some(v) = value {
            check_non_negative(&format!("{}.{}", tag, field), v)?;
        }
    }

    let mut flow_keys = HashSet::new();
    for flow in &monthly.flows {
        let context = format!("{} flows", tag);
        check_ref(&flow.from, flow_nodes, &context)?;
        check_ref(&flow.to, flow_nodes, &context)?;
        check_non_negative(&format!("{}.{}->{}", tag, flow.from, flow.to), flow.volume_m3)?;
        if !flow_keys.insert((&flow.from, &flow.to)) {
            return Err(ValidationError::DuplicateId {
                id: format!("{}->{}", flow.from, flow.to),
                context,
            });
        }
    }

    for (facility, evap) in &monthly.facility_evaporation_mm {
        check_ref(facility, facility_codes, &format!("{} facility evaporation", tag))?;
        check_non_negative(&format!("{}.{}.evaporation_mm", tag, facility), *evap)?;
    }
    for (facility, volume) in &monthly.storage_volumes_m3 {
        check_ref(facility, facility_codes, &format!("{} storage volumes", tag))?;
        check_non_negative(&format!("{}.{}.volume_m3", tag, facility), *volume)?;
    }
    Ok(())
}

fn unique_codes<'a>(
    codes: impl Iterator<Item = &'a String>,
    context: &str,
) -> Result<HashSet<&'a String>, ValidationError> {
    let mut seen = HashSet::new();
    for code in codes {
        if !seen.insert(code) {
            return Err(ValidationError::DuplicateId {
                id: code.clone(),
                context: context.to_string(),
            });
        }
    }
    Ok(seen)
}

fn check_ref(id: &String, known: &HashSet<&String>, context: &str) -> Result<(), ValidationError> {
    if !known.contains(id) {
        return Err(ValidationError::MissingReference {
            id: id.clone(),
            context: context.to_string(),
        });
    }
    Ok(())
}

fn check_finite(field: &str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be finite".to_string(),
        });
    }
    Ok(())
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ValidationError> {
    check_finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be non-negative".to_string(),
        });
    }
    Ok(())
}
