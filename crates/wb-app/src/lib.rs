//! Shared application service layer for the water balance.
//!
//! Frontends go through this crate to load site files, compile them into a
//! topology with project-backed providers, and run balances through the
//! process-wide `BalanceService`.

pub mod balance_service;
pub mod error;
pub mod project_service;
pub mod providers;
pub mod query;
pub mod site_compile;

pub use balance_service::{
    get_balance_service, install_balance_service, reset_balance_service, BalanceService,
};
pub use error::{AppError, AppResult};
pub use project_service::{
    import_measurements, list_areas, load_site, save_site, validate_site, AreaSummary,
    SiteReport,
};
pub use providers::ProjectRepository;
pub use query::{category_rows, flag_lines, summarize, BalanceSummary};
pub use site_compile::{compile_site, constants_for, engine_options, measurements_for};
