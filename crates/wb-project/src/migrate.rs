//! Site file migration framework.

use std::collections::HashMap;

use crate::schema::SiteProject;
use crate::ProjectError;

pub const LATEST_VERSION: u32 = 2;

pub fn migrate_to_latest(mut project: SiteProject) -> Result<SiteProject, ProjectError> {
    while project.version < LATEST_VERSION {
        project = migrate_one_version(project)?;
    }
    Ok(project)
}

fn migrate_one_version(project: SiteProject) -> Result<SiteProject, ProjectError> {
    match project.version {
        0 => migrate_v0_to_v1(project),
        1 => migrate_v1_to_v2(project),
        v => Err(ProjectError::Migration {
            what: format!("No migration path from version {}", v),
        }),
    }
}

fn migrate_v0_to_v1(mut project: SiteProject) -> Result<SiteProject, ProjectError> {
    project.version = 1;
    Ok(project)
}

/// Version 2 stores the `internal` flag on every connection instead of
/// leaving it implicit in the structure areas.
fn migrate_v1_to_v2(mut project: SiteProject) -> Result<SiteProject, ProjectError> {
    let areas: HashMap<&str, Option<&str>> = project
        .structures
        .iter()
        .map(|s| (s.code.as_str(), s.area.as_deref()))
        .collect();

    let mut resolved = Vec::with_capacity(project.connections.len());
    for connection in &project.connections {
        if connection.internal.is_some() {
            resolved.push(connection.internal);
            continue;
        }
        let from = areas.get(connection.from.as_str()).ok_or_else(|| ProjectError::Migration {
            what: format!("connection references unknown structure '{}'", connection.from),
        })?;
        let to = areas.get(connection.to.as_str()).ok_or_else(|| ProjectError::Migration {
            what: format!("connection references unknown structure '{}'", connection.to),
        })?;
        resolved.push(Some(from.is_some() && from == to));
    }

    for (connection, internal) in project.connections.iter_mut().zip(resolved) {
        connection.internal = internal;
    }
    project.version = 2;
    Ok(project)
}
