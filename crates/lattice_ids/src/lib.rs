//! Shared identifier wrappers for the Lattice control plane.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Error returned when parsing a UUID-backed identifier fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

macro_rules! define_uuid_id {
    ($name:ident, $label:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                Uuid::parse_str(value)
                    .map_err(|e| IdParseError::new(format!("Invalid {}: {}", $label, e)))?;
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

// Catalog / authorization domain
define_uuid_id!(SecurableId, "securable ID");
define_uuid_id!(GrantId, "grant ID");
define_uuid_id!(RowFilterId, "row filter ID");
define_uuid_id!(ColumnMaskId, "column mask ID");

// Pipeline orchestration domain
define_uuid_id!(PipelineId, "pipeline ID");
define_uuid_id!(PipelineJobId, "pipeline job ID");
define_uuid_id!(RunId, "run ID");
define_uuid_id!(JobRunId, "job run ID");

// Notebook / session domain
define_uuid_id!(NotebookId, "notebook ID");
define_uuid_id!(CellId, "cell ID");
define_uuid_id!(SessionId, "session ID");
define_uuid_id!(SessionJobId, "session job ID");

// Audit domain
define_uuid_id!(AuditId, "audit entry ID");

/// [`RowFilterId`] is ordered so filter-conflict tie-breaks ("smallest mask id
/// wins") can be expressed with a plain `min()` over bound ids. The same
/// holds for [`ColumnMaskId`].
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let id = PipelineId::new();
        let parsed = PipelineId::parse(id.as_str()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_non_uuid_input() {
        assert!(RunId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn mask_ids_order_deterministically() {
        let a = ColumnMaskId::parse("00000000-0000-0000-0000-000000000001").unwrap();
        let b = ColumnMaskId::parse("00000000-0000-0000-0000-000000000002").unwrap();
        assert!(a < b);
    }
}
