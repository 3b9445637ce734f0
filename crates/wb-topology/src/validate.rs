//! Structural validation logic.
//!
//! Only checks that make a topology unusable live here. House rules that a
//! topology can violate and still be calculated belong in `integrity`.

use std::collections::HashSet;

use wb_core::{ensure_non_negative, Id};

use crate::builder::ConnectionSpec;
use crate::error::{TopologyError, TopologyResult};
use crate::model::{Area, InflowSource, OutflowDestination, StorageFacility, Structure};

pub(crate) fn validate_structure(
    areas: &[Area],
    structures: &[Structure],
    connections: &[ConnectionSpec],
    inflow_sources: &[InflowSource],
    outflow_destinations: &[OutflowDestination],
    facilities: &[StorageFacility],
) -> TopologyResult<()> {
    check_unique("area", areas.iter().map(|a| a.code.as_str()))?;
    check_unique("structure", structures.iter().map(|s| s.code.as_str()))?;
    check_unique("facility", facilities.iter().map(|f| f.code.as_str()))?;
    // Sentinels share a namespace: their codes key metered volumes.
    check_unique(
        "sentinel",
        inflow_sources
            .iter()
            .map(|s| s.code.as_str())
            .chain(outflow_destinations.iter().map(|d| d.code.as_str())),
    )?;

    for s in structures {
        match s.area {
            Some(area) => check_ref("area", &s.code, area, areas.len())?,
            None if !s.is_group() => {
                return Err(TopologyError::StructureWithoutArea {
                    structure: s.code.clone(),
                });
            }
            None => {}
        }
        if let Some(parent) = s.parent {
            check_ref("structure", &s.code, parent, structures.len())?;
        }
        if let Some(catchment) = s.catchment_area_m2 {
            check_value("catchment area", &s.code, catchment)?;
        }
    }
    check_parent_chains(structures)?;

    for (i, c) in connections.iter().enumerate() {
        let owner = format!("connection #{}", i);
        check_ref("structure", &owner, c.from, structures.len())?;
        check_ref("structure", &owner, c.to, structures.len())?;
    }

    for src in inflow_sources {
        check_ref("structure", &src.code, src.target, structures.len())?;
    }
    for dst in outflow_destinations {
        check_ref("structure", &dst.code, dst.source, structures.len())?;
    }

    for f in facilities {
        check_value("capacity", &f.code, f.capacity_m3)?;
        check_value("current volume", &f.code, f.current_volume_m3)?;
        if let Some(surface) = f.surface_area_m2 {
            check_value("surface area", &f.code, surface)?;
        }
        if let Some(structure) = f.structure {
            check_ref("structure", &f.code, structure, structures.len())?;
        }
    }

    Ok(())
}

fn check_unique<'a>(
    what: &'static str,
    codes: impl Iterator<Item = &'a str>,
) -> TopologyResult<()> {
    let mut seen = HashSet::new();
    for code in codes {
        if !seen.insert(code) {
            return Err(TopologyError::DuplicateCode {
                what,
                code: code.to_string(),
            });
        }
    }
    Ok(())
}

fn check_ref(what: &'static str, owner: &str, id: Id, len: usize) -> TopologyResult<()> {
    if id.as_usize() >= len {
        return Err(TopologyError::DanglingReference {
            what,
            owner: owner.to_string(),
            index: id.index(),
        });
    }
    Ok(())
}

fn check_value(what: &'static str, owner: &str, value: f64) -> TopologyResult<()> {
    ensure_non_negative(value, what)
        .map(|_| ())
        .map_err(|_| TopologyError::InvalidValue {
            what,
            owner: owner.to_string(),
            value,
        })
}

fn check_parent_chains(structures: &[Structure]) -> TopologyResult<()> {
    for s in structures {
        let mut current = s.parent;
        let mut steps = 0;
        while let Some(parent) = current {
            if parent == s.id || steps > structures.len() {
                return Err(TopologyError::ParentCycle {
                    structure: s.code.clone(),
                });
            }
            current = structures[parent.as_usize()].parent;
            steps += 1;
        }
    }
    Ok(())
}
