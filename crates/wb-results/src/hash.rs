//! Content-based hashing of calculation inputs.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Fingerprint of everything a period calculation reads.
///
/// Any change in topology, constants or measurement revision yields a
/// different hash, which is what marks cached results stale.
pub fn compute_input_hash<T: Serialize>(
    topology: &T,
    constants: &BTreeMap<String, f64>,
    measurement_revision: u64,
) -> String {
    let mut hasher = Sha256::new();

    let topology_json = serde_json::to_string(topology).unwrap_or_default();
    hasher.update(topology_json.as_bytes());

    for (name, value) in constants {
        hasher.update(name.as_bytes());
        hasher.update(value.to_le_bytes());
    }

    hasher.update(measurement_revision.to_le_bytes());

    let result = hasher.finalize();
    format!("{:x}", result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Site {
        areas: Vec<&'static str>,
    }

    fn constants() -> BTreeMap<String, f64> {
        BTreeMap::from([("lined_seepage_rate_pct".to_string(), 0.1)])
    }

    #[test]
    fn hash_stability() {
        let site = Site { areas: vec!["UG"] };
        assert_eq!(
            compute_input_hash(&site, &constants(), 3),
            compute_input_hash(&site, &constants(), 3)
        );
    }

    #[test]
    fn hash_differs_for_different_inputs() {
        let site = Site { areas: vec!["UG"] };
        let other = Site {
            areas: vec!["UG", "PLANT"],
        };
        let base = compute_input_hash(&site, &constants(), 3);
        assert_ne!(base, compute_input_hash(&other, &constants(), 3));
        assert_ne!(base, compute_input_hash(&site, &constants(), 4));

        let mut changed = constants();
        changed.insert("lined_seepage_rate_pct".to_string(), 0.2);
        assert_ne!(base, compute_input_hash(&site, &changed, 3));
    }
}
