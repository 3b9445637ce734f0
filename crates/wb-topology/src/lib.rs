//! wb-topology: facility/topology layer for the water balance.
//!
//! Provides:
//! - Site data model (areas, structures, flow connections, sentinels, storage facilities)
//! - Incremental topology builder with structural validation
//! - An immutable, indexed `Topology` snapshot
//! - House-rule integrity checks (duplicate connections, dirty transfers, tank lining)
//!
//! # Example
//!
//! ```
//! use wb_topology::{ConnectionSpec, FlowType, StructureKind, TopologyBuilder};
//!
//! let mut builder = TopologyBuilder::new();
//! let plant = builder.add_area("PLANT", "Concentrator");
//! let mine = builder.add_area("UG", "Underground");
//! let rwd = builder.add_structure("RWD", "Return Water Dam", StructureKind::Dam, Some(plant));
//! let shaft = builder.add_structure("SHAFT", "Main Shaft", StructureKind::Sump, Some(mine));
//! builder.add_connection(ConnectionSpec::new(shaft, rwd, FlowType::Dewatering));
//! let topology = builder.build().unwrap();
//!
//! assert_eq!(topology.get_inter_area_transfers().len(), 1);
//! ```

pub mod builder;
pub mod error;
pub mod integrity;
pub mod model;
pub mod topology;
pub(crate) mod validate;

// Re-exports for ergonomics
pub use builder::{ConnectionSpec, FacilitySpec, TopologyBuilder};
pub use error::{TopologyError, TopologyResult};
pub use integrity::{check_integrity, IntegrityIssue, IntegrityReport};
pub use model::{
    Area, ConnectionKey, FacilityKind, FlowConnection, FlowType, InflowKind, InflowSource,
    InterAreaTransfer, OutflowDestination, OutflowKind, StorageFacility, Structure, StructureKind,
};
pub use topology::Topology;
