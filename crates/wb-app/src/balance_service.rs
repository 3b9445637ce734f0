//! Process-wide balance service.
//!
//! One `BalanceService` is shared by every frontend call site. It is built
//! lazily by a factory installed at startup, and tests can reset the slot.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;
use wb_calc::{
    kpi, BalanceEngine, BalanceResult, KpiInputs, KpiResult, MeasurementProvider, PeriodState,
};
use wb_core::CalculationPeriod;
use wb_project::SiteProject;
use wb_results::{StorageHistoryRecord, StorageHistoryStore};

use crate::error::{AppError, AppResult};
use crate::providers::ProjectRepository;
use crate::site_compile::{constants_for, engine_options, measurements_for};

type Factory = Arc<dyn Fn() -> AppResult<BalanceService> + Send + Sync>;

static FACTORY: Mutex<Option<Factory>> = parking_lot::const_mutex(None);
static INSTANCE: Mutex<Option<Arc<BalanceService>>> = parking_lot::const_mutex(None);

/// A balance engine behind a lock, safe to share between threads.
pub struct BalanceService {
    engine: Mutex<BalanceEngine>,
}

impl BalanceService {
    pub fn new(engine: BalanceEngine) -> Self {
        Self {
            engine: Mutex::new(engine),
        }
    }

    /// Engine over a loaded site, writing history to `history`.
    pub fn from_project(
        project: &SiteProject,
        history: Box<dyn StorageHistoryStore>,
    ) -> AppResult<Self> {
        let engine = BalanceEngine::new(
            Box::new(ProjectRepository::from_project(project)?),
            Box::new(measurements_for(project)?),
            Box::new(constants_for(project)),
            history,
        )
        .with_options(engine_options(&project.options));
        Ok(Self::new(engine))
    }

    pub fn calculate_for_date(
        &self,
        month: u32,
        year: i32,
        force_recalculate: bool,
    ) -> AppResult<BalanceResult> {
        Ok(self
            .engine
            .lock()
            .calculate_for_date(month, year, force_recalculate)?)
    }

    /// KPIs for a period, computed from its balance.
    pub fn kpis_for_date(&self, month: u32, year: i32) -> AppResult<KpiResult> {
        let mut engine = self.engine.lock();
        let result = engine.calculate_for_date(month, year, false)?;
        let topology = engine.topology()?;
        let measurements = engine.measurements();
        let recycled = kpi::recycled_volume(&topology, measurements, result.period);
        let inputs =
            KpiInputs::from_balance(&result, recycled, measurements.get_ore_tonnes(result.period));
        Ok(kpi::compute(&inputs))
    }

    /// Replace the measurement source, e.g. after an import.
    pub fn set_measurements(&self, measurements: Box<dyn MeasurementProvider>) {
        self.engine.lock().set_measurements(measurements);
    }

    /// Mark every cached period stale after a topology or data change.
    pub fn invalidate(&self) {
        info!("balance cache invalidated");
        self.engine.lock().invalidate();
    }

    pub fn period_state(&self, month: u32, year: i32) -> AppResult<PeriodState> {
        let period = CalculationPeriod::new(year, month)?;
        Ok(self.engine.lock().period_state(period))
    }

    pub fn history(&self) -> AppResult<Vec<StorageHistoryRecord>> {
        Ok(self.engine.lock().history().records()?)
    }
}

/// Install the factory used to build the shared service. Any existing
/// instance is dropped.
pub fn install_balance_service<F>(factory: F)
where
    F: Fn() -> AppResult<BalanceService> + Send + Sync + 'static,
{
    *FACTORY.lock() = Some(Arc::new(factory));
    *INSTANCE.lock() = None;
}

/// The shared service, built on first use.
///
/// The factory runs with no slot locked, so it may itself call back into
/// this module. When two callers race, the first stored instance wins. A
/// service built by a factory that was replaced meanwhile is returned but
/// not stored.
pub fn get_balance_service() -> AppResult<Arc<BalanceService>> {
    if let Some(service) = INSTANCE.lock().as_ref() {
        return Ok(Arc::clone(service));
    }
    let factory = FACTORY.lock().clone().ok_or(AppError::ServiceNotInstalled)?;
    let built = Arc::new((*factory)()?);

    let current = FACTORY.lock().clone();
    if !current.is_some_and(|f| Arc::ptr_eq(&f, &factory)) {
        return Ok(built);
    }
    let mut instance = INSTANCE.lock();
    let service = instance.get_or_insert(built);
    Ok(Arc::clone(service))
}

/// Clear the factory and the instance.
pub fn reset_balance_service() {
    *INSTANCE.lock() = None;
    *FACTORY.lock() = None;
}
