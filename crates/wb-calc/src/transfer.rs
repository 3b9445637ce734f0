//! Measured volumes of inter-area transfers.
//!
//! Both aggregators read transfers through here so that a transfer is valued
//! once and booked symmetrically: inflow to the destination area, outflow from
//! the source area.

use std::collections::HashMap;

use wb_core::{CalculationPeriod, StructureId};
use wb_topology::Topology;

use crate::providers::MeasurementProvider;
use crate::quality::{DataQualityFlags, QualityFlag};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TransferFlow {
    pub from_area: String,
    pub to_area: String,
    pub from_structure: String,
    pub to_structure: String,
    pub from_facility: Option<String>,
    pub to_facility: Option<String>,
    pub volume_m3: f64,
}

impl TransferFlow {
    pub fn label(&self) -> String {
        format!("{} -> {}", self.from_structure, self.to_structure)
    }
}

fn structure_code(topology: &Topology, id: StructureId) -> String {
    topology
        .structure(id)
        .map(|s| s.code.clone())
        .unwrap_or_default()
}

fn facility_code(topology: &Topology, id: StructureId) -> Option<String> {
    topology.primary_facility_at(id).map(|f| f.code.clone())
}

/// One direction between two structures and its metered volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DirectedReading {
    pub from: StructureId,
    pub to: StructureId,
    pub volume_m3: Option<f64>,
}

/// Every direction some connection needs between one pair of structures.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PairReadings {
    pub directions: Vec<DirectedReading>,
    /// Some connection on the pair may carry water either way.
    pub bidirectional: bool,
}

impl PairReadings {
    /// Directions to flag as unmeasured. A pair with a bidirectional link is
    /// flagged once, and only when no direction has a reading.
    pub fn missing(&self) -> Vec<DirectedReading> {
        if self.bidirectional {
            if self.directions.iter().any(|d| d.volume_m3.is_some()) {
                Vec::new()
            } else {
                self.directions.first().copied().into_iter().collect()
            }
        } else {
            self.directions
                .iter()
                .filter(|d| d.volume_m3.is_none())
                .copied()
                .collect()
        }
    }

    pub fn measured(&self) -> impl Iterator<Item = (DirectedReading, f64)> + '_ {
        self.directions
            .iter()
            .filter_map(|d| d.volume_m3.map(|v| (*d, v)))
    }

    /// Measured directions, then unmeasured ones at zero.
    pub fn booked(&self) -> Vec<(DirectedReading, f64)> {
        let mut booked: Vec<_> = self.measured().collect();
        booked.extend(self.missing().into_iter().map(|d| (d, 0.0)));
        booked
    }
}

/// Group links `(from, to, bidirectional)` by structure pair and read each
/// needed direction once, whatever order the links arrive in.
///
/// A link needs `from -> to`, and `to -> from` as well when bidirectional.
/// Pairs keep the order of their first link.
pub(crate) fn read_pairs<I, F>(links: I, mut read: F) -> Vec<PairReadings>
where
    I: IntoIterator<Item = (StructureId, StructureId, bool)>,
    F: FnMut(StructureId, StructureId) -> Option<f64>,
{
    let mut index: HashMap<(StructureId, StructureId), usize> = HashMap::new();
    let mut pairs: Vec<PairReadings> = Vec::new();
    for (from, to, bidirectional) in links {
        let slot = match index.get(&(from, to)) {
            Some(&slot) => slot,
            None => {
                pairs.push(PairReadings::default());
                let slot = pairs.len() - 1;
                index.insert((from, to), slot);
                index.insert((to, from), slot);
                slot
            }
        };
        let pair = &mut pairs[slot];
        pair.bidirectional |= bidirectional;
        let wanted = [Some((from, to)), bidirectional.then_some((to, from))];
        for (a, b) in wanted.into_iter().flatten() {
            if !pair.directions.iter().any(|d| d.from == a && d.to == b) {
                pair.directions.push(DirectedReading {
                    from: a,
                    to: b,
                    volume_m3: read(a, b),
                });
            }
        }
    }
    pairs
}

/// Volumes moved across area boundaries in `period`.
///
/// A bidirectional transfer may carry water either way; it is only flagged as
/// unmeasured when neither direction has a reading. Volumes are keyed by
/// structure pair, so each direction between two structures is read once even
/// when several connections join them.
pub(crate) fn resolve_transfers(
    topology: &Topology,
    measurements: &dyn MeasurementProvider,
    period: CalculationPeriod,
    flags: &mut DataQualityFlags,
) -> Vec<TransferFlow> {
    let links = topology
        .get_inter_area_transfers()
        .iter()
        .map(|t| (t.from_structure, t.to_structure, t.bidirectional));
    let pairs = read_pairs(links, |a, b| {
        measurements.get_volume(period, &structure_code(topology, a), &structure_code(topology, b))
    });

    let mut flows = Vec::new();
    for pair in pairs {
        for d in pair.missing() {
            flags.push(QualityFlag::MissingMeasurement {
                from: structure_code(topology, d.from),
                to: structure_code(topology, d.to),
            });
        }
        for (d, volume_m3) in pair.booked() {
            let (Some(from_area), Some(to_area)) = (topology.area_of(d.from), topology.area_of(d.to))
            else {
                continue;
            };
            flows.push(TransferFlow {
                from_area: from_area.code.clone(),
                to_area: to_area.code.clone(),
                from_structure: structure_code(topology, d.from),
                to_structure: structure_code(topology, d.to),
                from_facility: facility_code(topology, d.from),
                to_facility: facility_code(topology, d.to),
                volume_m3,
            });
        }
    }
    flows
}

#[cfg(test)]
mod tests {
    use super::*;
    use wb_core::Id;

    fn s(i: u32) -> StructureId {
        Id::from_index(i)
    }

    #[test]
    fn link_order_does_not_hide_the_reverse_direction() {
        let readings = |links: Vec<(StructureId, StructureId, bool)>| {
            read_pairs(links, |a, b| match (a.index(), b.index()) {
                (0, 1) => Some(400.0),
                (1, 0) => Some(50.0),
                _ => None,
            })
        };
        let one_way_first = readings(vec![(s(0), s(1), false), (s(0), s(1), true)]);
        let bidirectional_first = readings(vec![(s(0), s(1), true), (s(0), s(1), false)]);

        for pairs in [one_way_first, bidirectional_first] {
            assert_eq!(pairs.len(), 1);
            let booked = pairs[0].booked();
            assert_eq!(booked.len(), 2);
            assert!(booked.iter().any(|(d, v)| d.from == s(0) && *v == 400.0));
            assert!(booked.iter().any(|(d, v)| d.from == s(1) && *v == 50.0));
            assert!(pairs[0].missing().is_empty());
        }
    }

    #[test]
    fn each_direction_is_read_once() {
        let mut reads = 0;
        let pairs = read_pairs(
            vec![(s(0), s(1), false), (s(0), s(1), false), (s(1), s(0), true)],
            |_, _| {
                reads += 1;
                Some(1.0)
            },
        );
        assert_eq!(reads, 2);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].bidirectional);
    }

    #[test]
    fn one_way_directions_are_flagged_individually() {
        let pairs = read_pairs(vec![(s(0), s(1), false), (s(1), s(0), false)], |a, _| {
            (a == s(0)).then_some(10.0)
        });
        let missing = pairs[0].missing();
        assert_eq!(missing.len(), 1);
        assert_eq!((missing[0].from, missing[0].to), (s(1), s(0)));
        assert_eq!(pairs[0].booked().len(), 2);
    }

    #[test]
    fn unread_bidirectional_pair_is_flagged_once() {
        let pairs = read_pairs(vec![(s(0), s(1), true), (s(1), s(0), false)], |_, _| None);
        assert_eq!(pairs[0].missing().len(), 1);
        assert_eq!(pairs[0].booked(), vec![(pairs[0].directions[0], 0.0)]);
    }
}
