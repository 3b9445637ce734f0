//! House-rule integrity checks.
//!
//! These rules are not structural: a topology that breaks them still builds
//! and can still be calculated. Violations are reported, never repaired.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::model::{FlowType, StructureKind};
use crate::topology::Topology;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum IntegrityIssue {
    /// Two or more connections share (from, to, flow_type, subcategory, bidirectional, internal).
    DuplicateConnection {
        from: String,
        to: String,
        flow_type: FlowType,
        subcategory: String,
        count: usize,
    },
    /// Dirty water crossing an area boundary must be bidirectional.
    DirtyTransferNotBidirectional {
        from_area: String,
        to_area: String,
        from: String,
        to: String,
    },
    /// A tank carries a lining classification.
    TankLiningSet { facility: String },
    /// The stored internal flag disagrees with the endpoint areas.
    InternalFlagMismatch {
        from: String,
        to: String,
        flagged_internal: bool,
    },
    /// A sentinel hangs off a structure with no area (a group).
    SentinelWithoutArea { sentinel: String, structure: String },
    /// A storage facility sits on a structure of an unexpected kind.
    FacilityOnNonStorageStructure { facility: String, structure: String },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::DuplicateConnection {
                from,
                to,
                flow_type,
                subcategory,
                count,
            } => write!(
                f,
                "Connection {} -> {} ({:?}/{}) appears {} times",
                from, to, flow_type, subcategory, count
            ),
            IntegrityIssue::DirtyTransferNotBidirectional {
                from_area,
                to_area,
                from,
                to,
            } => write!(
                f,
                "Dirty transfer {} -> {} ({} -> {}) is not bidirectional",
                from, to, from_area, to_area
            ),
            IntegrityIssue::TankLiningSet { facility } => {
                write!(f, "Tank '{}' has a lining classification", facility)
            }
            IntegrityIssue::InternalFlagMismatch {
                from,
                to,
                flagged_internal,
            } => write!(
                f,
                "Connection {} -> {} is flagged internal={} but its areas disagree",
                from, to, flagged_internal
            ),
            IntegrityIssue::SentinelWithoutArea {
                sentinel,
                structure,
            } => write!(
                f,
                "Sentinel '{}' is attached to '{}' which has no area",
                sentinel, structure
            ),
            IntegrityIssue::FacilityOnNonStorageStructure {
                facility,
                structure,
            } => write!(
                f,
                "Facility '{}' is hosted by non-storage structure '{}'",
                facility, structure
            ),
        }
    }
}

/// All policy violations found in one topology.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntegrityReport {
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntegrityIssue> {
        self.issues.iter()
    }
}

pub fn check_integrity(topology: &Topology) -> IntegrityReport {
    let mut issues = Vec::new();
    let code = |id| {
        topology
            .structure(id)
            .map(|s| s.code.clone())
            .unwrap_or_default()
    };

    let mut counts: HashMap<_, (usize, usize)> = HashMap::new();
    for (i, c) in topology.get_flow_connections(None).into_iter().enumerate() {
        counts.entry(c.key()).or_insert((i, 0)).1 += 1;
    }
    let mut repeated: Vec<_> = counts.into_iter().filter(|(_, (_, n))| *n > 1).collect();
    repeated.sort_by_key(|(_, (first, _))| *first);
    for (key, (_, count)) in repeated {
        issues.push(IntegrityIssue::DuplicateConnection {
            from: code(key.from),
            to: code(key.to),
            flow_type: key.flow_type,
            subcategory: key.subcategory,
            count,
        });
    }

    for c in topology.get_flow_connections(None) {
        if topology.is_duplicate(c.id) {
            continue;
        }
        let from_area = topology.structure(c.from).and_then(|s| s.area);
        let to_area = topology.structure(c.to).and_then(|s| s.area);
        if let (Some(fa), Some(ta)) = (from_area, to_area) {
            if (fa == ta) != c.internal {
                issues.push(IntegrityIssue::InternalFlagMismatch {
                    from: code(c.from),
                    to: code(c.to),
                    flagged_internal: c.internal,
                });
            }
        }
    }

    for t in topology.get_inter_area_transfers() {
        if t.flow_type == FlowType::Dirty && !t.bidirectional {
            let area_code = |id| topology.area(id).map(|a| a.code.clone()).unwrap_or_default();
            issues.push(IntegrityIssue::DirtyTransferNotBidirectional {
                from_area: area_code(t.from_area),
                to_area: area_code(t.to_area),
                from: code(t.from_structure),
                to: code(t.to_structure),
            });
        }
    }

    for f in topology.get_storage_facilities(false) {
        if f.is_tank() && f.is_lined.is_some() {
            issues.push(IntegrityIssue::TankLiningSet {
                facility: f.code.clone(),
            });
        }
        if let Some(s) = f.structure.and_then(|id| topology.structure(id)) {
            if matches!(
                s.kind,
                StructureKind::Plant | StructureKind::Borehole | StructureKind::Junction
            ) {
                issues.push(IntegrityIssue::FacilityOnNonStorageStructure {
                    facility: f.code.clone(),
                    structure: s.code.clone(),
                });
            }
        }
    }

    let sentinels = topology
        .inflow_sources()
        .iter()
        .map(|s| (&s.code, s.target))
        .chain(
            topology
                .outflow_destinations()
                .iter()
                .map(|d| (&d.code, d.source)),
        );
    for (sentinel, structure) in sentinels {
        if topology.area_of(structure).is_none() {
            issues.push(IntegrityIssue::SentinelWithoutArea {
                sentinel: sentinel.clone(),
                structure: code(structure),
            });
        }
    }

    IntegrityReport { issues }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ConnectionSpec, FacilitySpec, TopologyBuilder};
    use crate::model::{FacilityKind, InflowKind};

    #[test]
    fn clean_topology_has_no_issues() {
        let mut b = TopologyBuilder::new();
        let a = b.add_area("A", "A");
        let z = b.add_area("Z", "Z");
        let s1 = b.add_structure("S1", "S1", StructureKind::Dam, Some(a));
        let s2 = b.add_structure("S2", "S2", StructureKind::Dam, Some(z));
        b.add_connection(ConnectionSpec::new(s1, s2, FlowType::Dirty).bidirectional());
        let report = check_integrity(&b.build().unwrap());
        assert!(report.is_clean(), "{:?}", report);
    }

    #[test]
    fn detects_each_policy_violation() {
        let mut b = TopologyBuilder::new();
        let a = b.add_area("A", "A");
        let z = b.add_area("Z", "Z");
        let s1 = b.add_structure("S1", "S1", StructureKind::Dam, Some(a));
        let s2 = b.add_structure("S2", "S2", StructureKind::Dam, Some(z));
        let s3 = b.add_structure("S3", "S3", StructureKind::Plant, Some(a));
        let group = b.add_structure("G", "Group", StructureKind::Group, None);
        b.add_connection(ConnectionSpec::new(s1, s2, FlowType::Dirty));
        b.add_connection(ConnectionSpec::new(s1, s3, FlowType::Clean));
        b.add_connection(ConnectionSpec::new(s1, s3, FlowType::Clean));
        b.add_connection(ConnectionSpec::new(s3, s1, FlowType::Clean).internal(false));
        b.add_inflow_source("RAIN-G", "Rain", group, InflowKind::Rainfall);
        let mut tank = FacilitySpec::new("TK1", FacilityKind::Tank, 50.0);
        tank.is_lined = Some(true);
        b.add_facility(tank);

        let report = check_integrity(&b.build().unwrap());
        let has = |pred: fn(&IntegrityIssue) -> bool| report.iter().any(pred);
        assert!(has(|i| matches!(i, IntegrityIssue::DuplicateConnection { count: 2, .. })));
        assert!(has(|i| matches!(i, IntegrityIssue::DirtyTransferNotBidirectional { .. })));
        assert!(has(|i| matches!(i, IntegrityIssue::TankLiningSet { .. })));
        assert!(has(|i| matches!(
            i,
            IntegrityIssue::InternalFlagMismatch {
                flagged_internal: false,
                ..
            }
        )));
        assert!(has(|i| matches!(i, IntegrityIssue::SentinelWithoutArea { .. })));
        assert_eq!(report.len(), 5);
    }
}
