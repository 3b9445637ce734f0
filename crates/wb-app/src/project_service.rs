//! Site loading, saving, validation, and introspection.

use std::path::Path;

use wb_project::{
    merge_measurements, parse_site, read_measurements_csv, render_site, validate_project,
    SiteFormat, SiteProject,
};
use wb_topology::{check_integrity, IntegrityIssue};

use crate::error::{AppError, AppResult};
use crate::site_compile::compile_site;

/// Counts and policy violations of a compiled site.
#[derive(Debug, Clone)]
pub struct SiteReport {
    pub name: String,
    pub area_count: usize,
    pub structure_count: usize,
    pub connection_count: usize,
    pub facility_count: usize,
    pub transfer_count: usize,
    pub issues: Vec<IntegrityIssue>,
}

/// Summary of an area for listing.
#[derive(Debug, Clone)]
pub struct AreaSummary {
    pub code: String,
    pub name: String,
    pub structure_count: usize,
    pub facility_count: usize,
    pub capacity_m3: f64,
    pub transfers_in: usize,
    pub transfers_out: usize,
}

/// Load a site file. JSON is accepted under a `.json` extension, YAML otherwise.
pub fn load_site(path: &Path) -> AppResult<SiteProject> {
    let content = std::fs::read_to_string(path).map_err(|e| AppError::SiteFileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(parse_site(&content, SiteFormat::from_path(path))?)
}

/// Save a site file, as JSON under a `.json` extension and YAML otherwise.
pub fn save_site(path: &Path, project: &SiteProject) -> AppResult<()> {
    let content = render_site(project, SiteFormat::from_path(path))?;
    std::fs::write(path, content).map_err(|e| AppError::SiteFileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Merge monthly measurements from a CSV file into the site. Returns the
/// number of months imported.
pub fn import_measurements(project: &mut SiteProject, csv_path: &Path) -> AppResult<usize> {
    let file = std::fs::File::open(csv_path).map_err(|e| AppError::SiteFileRead {
        path: csv_path.to_path_buf(),
        source: e,
    })?;
    let imported = read_measurements_csv(file)?;
    let months = imported.len();
    merge_measurements(project, imported);
    validate_project(project).map_err(|e| AppError::Project(e.to_string()))?;
    Ok(months)
}

/// Compile the site and run the house-rule integrity pass.
pub fn validate_site(project: &SiteProject) -> AppResult<SiteReport> {
    let topology = compile_site(project)?;
    let report = check_integrity(&topology);
    Ok(SiteReport {
        name: project.name.clone(),
        area_count: topology.get_areas().len(),
        structure_count: topology.get_structures(None).len(),
        connection_count: topology.get_flow_connections(None).len(),
        facility_count: topology.get_storage_facilities(false).len(),
        transfer_count: topology.get_inter_area_transfers().len(),
        issues: report.issues,
    })
}

pub fn list_areas(project: &SiteProject) -> AppResult<Vec<AreaSummary>> {
    let topology = compile_site(project)?;
    let transfers = topology.get_inter_area_transfers();
    Ok(topology
        .get_areas()
        .iter()
        .map(|area| {
            let facilities: Vec<_> = topology
                .get_storage_facilities(false)
                .into_iter()
                .filter(|f| f.structure.and_then(|s| topology.area_of(s)).map(|a| a.id) == Some(area.id))
                .collect();
            AreaSummary {
                code: area.code.clone(),
                name: area.name.clone(),
                structure_count: topology.get_structures(Some(area.id)).len(),
                facility_count: facilities.len(),
                capacity_m3: facilities.iter().filter(|f| f.active).map(|f| f.capacity_m3).sum(),
                transfers_in: transfers.iter().filter(|t| t.to_area == area.id).count(),
                transfers_out: transfers.iter().filter(|t| t.from_area == area.id).count(),
            }
        })
        .collect())
}
