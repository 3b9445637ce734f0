//! Topology repository over a loaded site project.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use wb_calc::{CalcResult, TopologyRepository};
use wb_project::SiteProject;
use wb_topology::{StorageFacility, Topology};

use crate::error::AppResult;
use crate::site_compile::compile_site;

/// Serves a compiled site. The facility list is cached until a caller asks
/// for a fresh read.
pub struct ProjectRepository {
    topology: Arc<Topology>,
    facilities: Mutex<Option<Vec<StorageFacility>>>,
}

impl ProjectRepository {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology: Arc::new(topology),
            facilities: Mutex::new(None),
        }
    }

    pub fn from_project(project: &SiteProject) -> AppResult<Self> {
        Ok(Self::new(compile_site(project)?))
    }

    /// Drop the cached facility list.
    pub fn clear_cache(&self) {
        *self.facilities.lock() = None;
    }

    pub fn is_cached(&self) -> bool {
        self.facilities.lock().is_some()
    }
}

impl TopologyRepository for ProjectRepository {
    fn load_topology(&self) -> CalcResult<Arc<Topology>> {
        Ok(Arc::clone(&self.topology))
    }

    fn get_storage_facilities(
        &self,
        active_only: bool,
        use_cache: bool,
    ) -> CalcResult<Vec<StorageFacility>> {
        let mut cache = self.facilities.lock();
        if !use_cache || cache.is_none() {
            debug!("reloading storage facilities");
            *cache = Some(
                self.topology
                    .get_storage_facilities(false)
                    .into_iter()
                    .cloned()
                    .collect(),
            );
        }
        Ok(cache
            .iter()
            .flatten()
            .filter(|f| f.active || !active_only)
            .cloned()
            .collect())
    }
}
