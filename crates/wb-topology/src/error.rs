//! Topology-specific error types.

/// Structural errors found while building a topology.
///
/// These are fatal: a topology that fails to build never reaches a calculation.
#[derive(Debug, Clone, PartialEq)]
pub enum TopologyError {
    /// Two objects of the same kind share a code.
    DuplicateCode { what: &'static str, code: String },

    /// A reference points at an object that doesn't exist.
    DanglingReference {
        what: &'static str,
        owner: String,
        index: u32,
    },

    /// A non-group structure has no owning area.
    StructureWithoutArea { structure: String },

    /// A structure is its own parent, directly or through a chain.
    ParentCycle { structure: String },

    /// A numeric attribute is NaN/inf or negative.
    InvalidValue {
        what: &'static str,
        owner: String,
        value: f64,
    },

    /// Code lookup failed.
    UnknownCode { what: &'static str, code: String },
}

pub type TopologyResult<T> = Result<T, TopologyError>;

impl std::fmt::Display for TopologyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyError::DuplicateCode { what, code } => {
                write!(f, "Duplicate {} code '{}'", what, code)
            }
            TopologyError::DanglingReference { what, owner, index } => {
                write!(f, "'{}' refers to non-existent {} {}", owner, what, index)
            }
            TopologyError::StructureWithoutArea { structure } => {
                write!(f, "Structure '{}' is not a group and has no area", structure)
            }
            TopologyError::ParentCycle { structure } => {
                write!(f, "Structure '{}' has a cyclic parent chain", structure)
            }
            TopologyError::InvalidValue { what, owner, value } => {
                write!(f, "Invalid {} for '{}': {}", what, owner, value)
            }
            TopologyError::UnknownCode { what, code } => {
                write!(f, "Unknown {} code '{}'", what, code)
            }
        }
    }
}

impl std::error::Error for TopologyError {}
