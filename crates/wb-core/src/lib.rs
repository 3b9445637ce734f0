//! wb-core: stable foundation for the water-balance workspace.
//!
//! Contains:
//! - units (uom SI types + constructors for volumes, areas, depths)
//! - numeric (Real + float checks + percent helper)
//! - ids (compact IDs for topology objects)
//! - period (the monthly calculation period)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod period;
pub mod timing;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use error::{WbError, WbResult};
pub use ids::*;
pub use numeric::*;
pub use period::CalculationPeriod;
pub use units::*;
