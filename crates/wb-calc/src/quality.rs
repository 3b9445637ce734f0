//! Data-quality diagnostics.
//!
//! Degraded inputs never abort a calculation. Each substitution or clamp is
//! recorded here so callers can judge how far to trust the numbers.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QualityFlag {
    /// A flow exists in the topology but has no measured volume; zero was used.
    MissingMeasurement { from: String, to: String },
    /// No site rainfall for the month; zero was used.
    MissingRainfall,
    /// No regional evaporation for the month; the default was used.
    MissingRegionalEvaporation { fallback_mm: f64 },
    /// Open-surface facility without a usable surface area; skipped for
    /// rainfall and evaporation.
    ZeroSurfaceArea { facility: String },
    /// Rainfall sentinel on a structure with no catchment area and no metered value.
    MissingCatchmentArea { sentinel: String, structure: String },
    /// No prior closing volume in history; the opening is a cold start.
    NoPriorHistory { facility: String },
    /// The prior month is missing from history; an older closing was carried forward.
    HistoryGap { facility: String, from_period: String },
    EvaporationClamped {
        facility: String,
        requested_m3: f64,
        clamped_m3: f64,
    },
    /// Evaporation plus seepage exceeds the volume available.
    LossesExceedVolume {
        facility: String,
        losses_m3: f64,
        volume_m3: f64,
    },
    /// Dam or pond with unknown lining; the unlined rate was used.
    MissingLiningClassification { facility: String },
    /// Calculated closing volume went negative and was clamped to zero.
    NegativeCalculatedVolume { facility: String, raw_m3: f64 },
    CapacityExceeded {
        facility: String,
        closing_m3: f64,
        capacity_m3: f64,
    },
    BelowMinimumReserve {
        facility: String,
        closing_m3: f64,
        reserve_m3: f64,
    },
}

impl QualityFlag {
    /// Flags that mean an input was guessed rather than measured.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            QualityFlag::MissingMeasurement { .. }
                | QualityFlag::MissingRainfall
                | QualityFlag::MissingRegionalEvaporation { .. }
                | QualityFlag::MissingCatchmentArea { .. }
                | QualityFlag::MissingLiningClassification { .. }
                | QualityFlag::NegativeCalculatedVolume { .. }
                | QualityFlag::HistoryGap { .. }
        )
    }

    pub fn facility(&self) -> Option<&str> {
        match self {
            QualityFlag::ZeroSurfaceArea { facility }
            | QualityFlag::NoPriorHistory { facility }
            | QualityFlag::HistoryGap { facility, .. }
            | QualityFlag::EvaporationClamped { facility, .. }
            | QualityFlag::LossesExceedVolume { facility, .. }
            | QualityFlag::MissingLiningClassification { facility }
            | QualityFlag::NegativeCalculatedVolume { facility, .. }
            | QualityFlag::CapacityExceeded { facility, .. }
            | QualityFlag::BelowMinimumReserve { facility, .. } => Some(facility),
            _ => None,
        }
    }
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityFlag::MissingMeasurement { from, to } => {
                write!(f, "No measured volume for {} -> {}; zero used", from, to)
            }
            QualityFlag::MissingRainfall => write!(f, "No rainfall measured; zero used"),
            QualityFlag::MissingRegionalEvaporation { fallback_mm } => write!(
                f,
                "No regional evaporation measured; default {} mm used",
                fallback_mm
            ),
            QualityFlag::ZeroSurfaceArea { facility } => write!(
                f,
                "{}: no surface area, skipped for rainfall and evaporation",
                facility
            ),
            QualityFlag::MissingCatchmentArea {
                sentinel,
                structure,
            } => write!(
                f,
                "{}: rainfall onto '{}' has no catchment area or metered value",
                sentinel, structure
            ),
            QualityFlag::NoPriorHistory { facility } => {
                write!(f, "{}: no prior closing volume, cold start", facility)
            }
            QualityFlag::HistoryGap {
                facility,
                from_period,
            } => write!(
                f,
                "{}: previous month not computed, opening carried from {}",
                facility, from_period
            ),
            QualityFlag::EvaporationClamped {
                facility,
                requested_m3,
                clamped_m3,
            } => write!(
                f,
                "{}: evaporation {:.1} m3 clamped to {:.1} m3",
                facility, requested_m3, clamped_m3
            ),
            QualityFlag::LossesExceedVolume {
                facility,
                losses_m3,
                volume_m3,
            } => write!(
                f,
                "{}: losses {:.1} m3 exceed volume {:.1} m3",
                facility, losses_m3, volume_m3
            ),
            QualityFlag::MissingLiningClassification { facility } => write!(
                f,
                "{}: lining unknown, unlined seepage rate used",
                facility
            ),
            QualityFlag::NegativeCalculatedVolume { facility, raw_m3 } => write!(
                f,
                "{}: calculated closing {:.1} m3 clamped to zero",
                facility, raw_m3
            ),
            QualityFlag::CapacityExceeded {
                facility,
                closing_m3,
                capacity_m3,
            } => write!(
                f,
                "{}: closing {:.1} m3 exceeds capacity {:.1} m3",
                facility, closing_m3, capacity_m3
            ),
            QualityFlag::BelowMinimumReserve {
                facility,
                closing_m3,
                reserve_m3,
            } => write!(
                f,
                "{}: closing {:.1} m3 below minimum reserve {:.1} m3",
                facility, closing_m3, reserve_m3
            ),
        }
    }
}

/// Ordered, de-duplicated set of quality flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DataQualityFlags {
    flags: Vec<QualityFlag>,
}

impl DataQualityFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a flag unless an identical one is already present.
    pub fn push(&mut self, flag: QualityFlag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }

    pub fn extend(&mut self, other: DataQualityFlags) {
        for flag in other.flags {
            self.push(flag);
        }
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QualityFlag> {
        self.flags.iter()
    }

    pub fn has_degraded(&self) -> bool {
        self.flags.iter().any(QualityFlag::is_degraded)
    }

    pub fn count(&self, pred: impl Fn(&QualityFlag) -> bool) -> usize {
        self.flags.iter().filter(|f| pred(f)).count()
    }

    pub fn for_facility<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a QualityFlag> {
        self.flags
            .iter()
            .filter(move |f| f.facility() == Some(code))
    }
}
