//! Monthly water-balance calculation engine.
//!
//! Given a site topology and one month of measurements, the engine produces a
//! closed balance: inflows, outflows, storage change and the residual error,
//! together with data-quality flags describing every substituted input.
//!
//! Pipeline per period: storage openings → inflow and outflow aggregation →
//! storage reconciliation → balance error, status and per-area balances.

pub mod constants;
pub mod engine;
pub mod error;
pub mod inflow;
pub mod kpi;
pub mod memory;
pub mod outflow;
pub mod providers;
pub mod quality;
pub mod result;
pub mod storage;
pub(crate) mod transfer;

pub use constants::{BalanceConstants, StaticConstants};
pub use engine::{BalanceEngine, EngineOptions, PeriodState};
pub use error::{CalcError, CalcResult};
pub use inflow::InflowAggregator;
pub use kpi::{KpiInputs, KpiResult};
pub use memory::{InMemoryMeasurements, StaticTopology};
pub use outflow::OutflowAggregator;
pub use providers::{ConstantsProvider, MeasurementProvider, TopologyRepository};
pub use quality::{DataQualityFlags, QualityFlag};
pub use result::{
    AreaBalance, BalanceResult, BalanceStatus, Contribution, FacilityStorage, FlowCategory,
    FlowTotals, InflowCategory, InflowResult, OpeningSource, OutflowCategory, OutflowResult,
    StorageChange,
};
pub use storage::{FacilityLosses, Opening, StorageReconciler};
