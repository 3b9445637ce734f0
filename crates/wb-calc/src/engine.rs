//! Balance engine: orchestrates one period calculation and caches results.
//!
//! Cache state per period:
//! not computed → computing → cached valid → stale → computing → ...
//! A cached result is served only while its input fingerprint still matches
//! and nothing has marked it stale. Calculations are synchronous and cannot be
//! cancelled.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use wb_core::timing::{Timer, PERIOD_CALCULATIONS};
use wb_core::CalculationPeriod;
use wb_results::{compute_input_hash, StorageHistoryStore};
use wb_topology::{check_integrity, Topology};

use crate::constants::BalanceConstants;
use crate::error::{CalcError, CalcResult};
use crate::inflow::InflowAggregator;
use crate::outflow::OutflowAggregator;
use crate::providers::{ConstantsProvider, MeasurementProvider, TopologyRepository};
use crate::quality::DataQualityFlags;
use crate::result::{error_percent, AreaBalance, BalanceResult, BalanceStatus, InflowCategory, OutflowCategory};
use crate::storage::{internal_moves, net_flows, StorageReconciler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineOptions {
    /// Policy violations abort the calculation instead of being reported.
    pub strict_topology: bool,
    /// Upsert storage history after each calculation.
    pub persist_history: bool,
    /// List inactive facilities in the storage breakdown.
    pub report_inactive_facilities: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            strict_topology: false,
            persist_history: true,
            report_inactive_facilities: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodState {
    NotComputed,
    Computing,
    CachedValid,
    Stale,
}

#[derive(Debug)]
struct CacheEntry {
    state: PeriodState,
    fingerprint: String,
    result: Option<Arc<BalanceResult>>,
}

pub struct BalanceEngine {
    topology: Box<dyn TopologyRepository>,
    measurements: Box<dyn MeasurementProvider>,
    constants: Box<dyn ConstantsProvider>,
    history: Box<dyn StorageHistoryStore>,
    options: EngineOptions,
    cache: BTreeMap<CalculationPeriod, CacheEntry>,
}

impl BalanceEngine {
    pub fn new(
        topology: Box<dyn TopologyRepository>,
        measurements: Box<dyn MeasurementProvider>,
        constants: Box<dyn ConstantsProvider>,
        history: Box<dyn StorageHistoryStore>,
    ) -> Self {
        Self {
            topology,
            measurements,
            constants,
            history,
            options: EngineOptions::default(),
            cache: BTreeMap::new(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn history(&self) -> &dyn StorageHistoryStore {
        self.history.as_ref()
    }

    pub fn measurements(&self) -> &dyn MeasurementProvider {
        self.measurements.as_ref()
    }

    pub fn topology(&self) -> CalcResult<Arc<Topology>> {
        self.topology.load_topology()
    }

    /// Replace the measurement source. Every cached period becomes stale.
    pub fn set_measurements(&mut self, measurements: Box<dyn MeasurementProvider>) {
        self.measurements = measurements;
        self.invalidate();
    }

    pub fn period_state(&self, period: CalculationPeriod) -> PeriodState {
        self.cache
            .get(&period)
            .map(|e| e.state)
            .unwrap_or(PeriodState::NotComputed)
    }

    pub fn cached(&self, period: CalculationPeriod) -> Option<Arc<BalanceResult>> {
        self.cache
            .get(&period)
            .filter(|e| e.state == PeriodState::CachedValid)
            .and_then(|e| e.result.clone())
    }

    /// Mark every cached period stale.
    pub fn invalidate(&mut self) {
        debug!(periods = self.cache.len(), "invalidating balance cache");
        for entry in self.cache.values_mut() {
            entry.state = PeriodState::Stale;
        }
    }

    pub fn invalidate_period(&mut self, period: CalculationPeriod) {
        if let Some(entry) = self.cache.get_mut(&period) {
            debug!(period = %period, "invalidating cached period");
            entry.state = PeriodState::Stale;
        }
    }

    /// Balance for `month`/`year`, from cache when still valid.
    ///
    /// Fatal errors (topology unavailable, invalid constants, history I/O,
    /// strict-mode policy violations) return `Err` and leave no result.
    pub fn calculate_for_date(
        &mut self,
        month: u32,
        year: i32,
        force_recalculate: bool,
    ) -> CalcResult<BalanceResult> {
        let period = CalculationPeriod::new(year, month)?;
        let topology = self.topology.load_topology()?;
        let constants = BalanceConstants::resolve(self.constants.as_ref())?;
        let fingerprint =
            compute_input_hash(topology.as_ref(), &constants.as_map(), self.measurements.revision());

        if !force_recalculate {
            if let Some(entry) = self.cache.get_mut(&period) {
                if entry.state == PeriodState::CachedValid && entry.fingerprint == fingerprint {
                    if let Some(result) = &entry.result {
                        debug!(period = %period, "balance cache hit");
                        return Ok(result.as_ref().clone());
                    }
                }
                if entry.fingerprint != fingerprint {
                    debug!(period = %period, "cached balance is stale");
                    entry.state = PeriodState::Stale;
                }
            }
        }

        self.cache.insert(
            period,
            CacheEntry {
                state: PeriodState::Computing,
                fingerprint: fingerprint.clone(),
                result: None,
            },
        );

        let timer = Timer::start();
        let outcome = self.compute(period, &topology, &constants, fingerprint, force_recalculate);
        if let Some(elapsed) = timer.stop() {
            PERIOD_CALCULATIONS.record(elapsed);
            debug!(period = %period, elapsed_s = elapsed, "period computed");
        }

        match outcome {
            Ok(result) => {
                let result = Arc::new(result);
                if let Some(entry) = self.cache.get_mut(&period) {
                    entry.state = PeriodState::CachedValid;
                    entry.result = Some(Arc::clone(&result));
                }
                // Later openings depend on this period's closings.
                for (_, entry) in self.cache.range_mut(period.next()..) {
                    entry.state = PeriodState::Stale;
                }
                Ok(result.as_ref().clone())
            }
            Err(e) => {
                self.cache.remove(&period);
                Err(e)
            }
        }
    }

    fn compute(
        &mut self,
        period: CalculationPeriod,
        topology: &Topology,
        constants: &BalanceConstants,
        fingerprint: String,
        force_recalculate: bool,
    ) -> CalcResult<BalanceResult> {
        let integrity = check_integrity(topology);
        for issue in integrity.iter() {
            warn!(period = %period, "{}", issue);
        }
        if self.options.strict_topology {
            if let Some(first) = integrity.issues.first() {
                return Err(CalcError::PolicyViolation {
                    count: integrity.len(),
                    first: first.to_string(),
                });
            }
        }

        let measurements = self.measurements.as_ref();
        let facilities = self.topology.get_storage_facilities(
            !self.options.report_inactive_facilities,
            !force_recalculate,
        )?;

        let mut flags = DataQualityFlags::new();
        let reconciler =
            StorageReconciler::new(*constants).include_inactive(self.options.report_inactive_facilities);
        let openings = reconciler.openings(period, &facilities, self.history.as_ref(), measurements, &mut flags)?;
        let current: BTreeMap<String, f64> = openings
            .iter()
            .map(|(code, o)| (code.clone(), o.volume_m3))
            .collect();

        let inflows = InflowAggregator.compute(period, topology, measurements, &mut flags);
        let outflows =
            OutflowAggregator::new(*constants).compute(period, topology, measurements, &current, &mut flags);
        let moves = internal_moves(topology, measurements, period, &mut flags);
        let net = net_flows(&inflows, &outflows, &moves);
        let storage = reconciler.compute(period, topology, &facilities, &openings, &net, measurements, &mut flags);

        if self.options.persist_history {
            reconciler.persist(period, &storage, self.history.as_mut())?;
        }

        let balance_error_m3 = inflows.total_m3 - outflows.total_m3 - storage.delta_m3;
        let error_pct = error_percent(balance_error_m3, inflows.total_m3, constants.error_pct_epsilon_m3);
        let status = BalanceStatus::classify(
            error_pct,
            constants.balance_error_warn_pct,
            constants.balance_error_fail_pct,
            flags.has_degraded(),
        );

        let areas = topology
            .get_areas()
            .iter()
            .map(|area| {
                let inflow_m3 = inflows.area(&area.code);
                let outflow_m3 = outflows.area(&area.code);
                let storage_delta_m3: f64 = storage
                    .facilities
                    .iter()
                    .filter(|f| f.area.as_deref() == Some(area.code.as_str()))
                    .map(|f| f.delta_m3)
                    .sum();
                let area_error = inflow_m3 - outflow_m3 - storage_delta_m3;
                AreaBalance {
                    area_code: area.code.clone(),
                    area_name: area.name.clone(),
                    inflow_m3,
                    outflow_m3,
                    transfer_in_m3: area_transfer(&inflows.items, &area.code, InflowCategory::TransferIn),
                    transfer_out_m3: area_transfer(&outflows.items, &area.code, OutflowCategory::TransferOut),
                    storage_delta_m3,
                    balance_error_m3: area_error,
                    error_pct: error_percent(area_error, inflow_m3, constants.error_pct_epsilon_m3),
                }
            })
            .collect();

        info!(
            period = %period,
            inflow_m3 = inflows.total_m3,
            outflow_m3 = outflows.total_m3,
            storage_delta_m3 = storage.delta_m3,
            error_pct,
            status = status.as_str(),
            flags = flags.len(),
            "balance computed"
        );

        Ok(BalanceResult {
            period,
            label: period.label(),
            inflows,
            outflows,
            storage,
            balance_error_m3,
            error_pct,
            status,
            areas,
            quality: flags,
            integrity: integrity.issues,
            fingerprint,
            computed_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

fn area_transfer<C: PartialEq + Copy>(
    items: &[crate::result::Contribution<C>],
    area_code: &str,
    category: C,
) -> f64 {
    items
        .iter()
        .filter(|i| i.category == category && i.area.as_deref() == Some(area_code))
        .map(|i| i.volume_m3)
        .sum()
}
