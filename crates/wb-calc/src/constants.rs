//! Named calculation constants.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{CalcError, CalcResult};
use crate::providers::ConstantsProvider;

pub const LINED_SEEPAGE_RATE_PCT: &str = "lined_seepage_rate_pct";
pub const UNLINED_SEEPAGE_RATE_PCT: &str = "unlined_seepage_rate_pct";
pub const DEFAULT_EVAPORATION_MM: &str = "default_evaporation_mm";
pub const MINIMUM_RESERVE_PCT: &str = "minimum_reserve_pct";
pub const BALANCE_ERROR_WARN_PCT: &str = "balance_error_warn_pct";
pub const BALANCE_ERROR_FAIL_PCT: &str = "balance_error_fail_pct";
pub const ERROR_PCT_EPSILON_M3: &str = "error_pct_epsilon_m3";

/// Resolved constants for one calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BalanceConstants {
    /// Monthly seepage of a lined facility, percent of current volume.
    pub lined_seepage_rate_pct: f64,
    pub unlined_seepage_rate_pct: f64,
    /// Used when no regional evaporation is measured.
    pub default_evaporation_mm: f64,
    /// Closing volume below this share of capacity is flagged.
    pub minimum_reserve_pct: f64,
    pub balance_error_warn_pct: f64,
    pub balance_error_fail_pct: f64,
    /// Floor of the error-percent denominator.
    pub error_pct_epsilon_m3: f64,
}

impl Default for BalanceConstants {
    fn default() -> Self {
        Self {
            lined_seepage_rate_pct: 0.1,
            unlined_seepage_rate_pct: 0.5,
            default_evaporation_mm: 150.0,
            minimum_reserve_pct: 10.0,
            balance_error_warn_pct: 5.0,
            balance_error_fail_pct: 10.0,
            error_pct_epsilon_m3: 1e-6,
        }
    }
}

impl BalanceConstants {
    pub fn resolve(provider: &dyn ConstantsProvider) -> CalcResult<Self> {
        let d = Self::default();
        let constants = Self {
            lined_seepage_rate_pct: provider
                .get_constant(LINED_SEEPAGE_RATE_PCT, d.lined_seepage_rate_pct),
            unlined_seepage_rate_pct: provider
                .get_constant(UNLINED_SEEPAGE_RATE_PCT, d.unlined_seepage_rate_pct),
            default_evaporation_mm: provider
                .get_constant(DEFAULT_EVAPORATION_MM, d.default_evaporation_mm),
            minimum_reserve_pct: provider.get_constant(MINIMUM_RESERVE_PCT, d.minimum_reserve_pct),
            balance_error_warn_pct: provider
                .get_constant(BALANCE_ERROR_WARN_PCT, d.balance_error_warn_pct),
            balance_error_fail_pct: provider
                .get_constant(BALANCE_ERROR_FAIL_PCT, d.balance_error_fail_pct),
            error_pct_epsilon_m3: provider.get_constant(ERROR_PCT_EPSILON_M3, d.error_pct_epsilon_m3),
        };
        constants.validate()?;
        Ok(constants)
    }

    pub fn validate(&self) -> CalcResult<()> {
        let percent = [
            (LINED_SEEPAGE_RATE_PCT, self.lined_seepage_rate_pct),
            (UNLINED_SEEPAGE_RATE_PCT, self.unlined_seepage_rate_pct),
            (MINIMUM_RESERVE_PCT, self.minimum_reserve_pct),
        ];
        for (name, value) in percent {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(CalcError::InvalidConstant {
                    name,
                    value,
                    reason: "must lie in [0, 100]",
                });
            }
        }
        let non_negative = [
            (DEFAULT_EVAPORATION_MM, self.default_evaporation_mm),
            (BALANCE_ERROR_WARN_PCT, self.balance_error_warn_pct),
            (BALANCE_ERROR_FAIL_PCT, self.balance_error_fail_pct),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(CalcError::InvalidConstant {
                    name,
                    value,
                    reason: "must be finite and non-negative",
                });
            }
        }
        if self.balance_error_fail_pct < self.balance_error_warn_pct {
            return Err(CalcError::InvalidConstant {
                name: BALANCE_ERROR_FAIL_PCT,
                value: self.balance_error_fail_pct,
                reason: "must not be below the warning threshold",
            });
        }
        if !self.error_pct_epsilon_m3.is_finite() || self.error_pct_epsilon_m3 <= 0.0 {
            return Err(CalcError::InvalidConstant {
                name: ERROR_PCT_EPSILON_M3,
                value: self.error_pct_epsilon_m3,
                reason: "must be positive",
            });
        }
        Ok(())
    }

    pub fn seepage_rate_pct(&self, lined: bool) -> f64 {
        if lined {
            self.lined_seepage_rate_pct
        } else {
            self.unlined_seepage_rate_pct
        }
    }

    /// All values by name, including defaults.
    pub fn as_map(&self) -> BTreeMap<String, f64> {
        [
            (LINED_SEEPAGE_RATE_PCT, self.lined_seepage_rate_pct),
            (UNLINED_SEEPAGE_RATE_PCT, self.unlined_seepage_rate_pct),
            (DEFAULT_EVAPORATION_MM, self.default_evaporation_mm),
            (MINIMUM_RESERVE_PCT, self.minimum_reserve_pct),
            (BALANCE_ERROR_WARN_PCT, self.balance_error_warn_pct),
            (BALANCE_ERROR_FAIL_PCT, self.balance_error_fail_pct),
            (ERROR_PCT_EPSILON_M3, self.error_pct_epsilon_m3),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// Constants from a fixed table; unknown names fall back to the default.
#[derive(Debug, Clone, Default)]
pub struct StaticConstants {
    values: BTreeMap<String, f64>,
}

impl StaticConstants {
    pub fn new(values: BTreeMap<String, f64>) -> Self {
        Self { values }
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }
}

impl ConstantsProvider for StaticConstants {
    fn get_constant(&self, name: &str, default: f64) -> f64 {
        self.values.get(name).copied().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_from_empty_table() {
        let c = BalanceConstants::resolve(&StaticConstants::default()).unwrap();
        assert_eq!(c, BalanceConstants::default());
        assert_eq!(c.seepage_rate_pct(true), 0.1);
        assert_eq!(c.seepage_rate_pct(false), 0.5);
    }

    #[test]
    fn configured_value_overrides_default() {
        let provider = StaticConstants::default().with(UNLINED_SEEPAGE_RATE_PCT, 1.5);
        let c = BalanceConstants::resolve(&provider).unwrap();
        assert_eq!(c.unlined_seepage_rate_pct, 1.5);
        assert_eq!(c.as_map()[UNLINED_SEEPAGE_RATE_PCT], 1.5);
    }

    #[test]
    fn seepage_rate_out_of_range_is_fatal() {
        let provider = StaticConstants::default().with(LINED_SEEPAGE_RATE_PCT, 120.0);
        assert!(matches!(
            BalanceConstants::resolve(&provider),
            Err(CalcError::InvalidConstant {
                name: LINED_SEEPAGE_RATE_PCT,
                ..
            })
        ));
    }

    #[test]
    fn fail_threshold_below_warn_is_fatal() {
        let provider = StaticConstants::default()
            .with(BALANCE_ERROR_WARN_PCT, 8.0)
            .with(BALANCE_ERROR_FAIL_PCT, 4.0);
        assert!(BalanceConstants::resolve(&provider).is_err());
    }
}
