//! Securables and privilege grants: the authorization surface the rewriter
//! consults before touching a table.

use lattice_ids::{GrantId, SecurableId};
use serde::{Deserialize, Serialize};

/// The kind of object a privilege can be granted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurableKind {
    Catalog,
    Schema,
    Table,
    Column,
}

/// A tagged identifier pair `(kind, id)`. Ownership is hierarchical:
/// table → schema → catalog. Every privilege grant targets exactly one
/// securable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Securable {
    pub id: SecurableId,
    pub kind: SecurableKind,
    /// Fully qualified name, e.g. `catalog.schema.table` or `catalog.schema.table.column`.
    pub qualified_name: String,
    pub parent: Option<SecurableId>,
}

impl Securable {
    pub fn new(kind: SecurableKind, qualified_name: impl Into<String>) -> Self {
        Self {
            id: SecurableId::new(),
            kind,
            qualified_name: qualified_name.into(),
            parent: None,
        }
    }
}

/// A privilege that can be granted on a securable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Privilege {
    Select,
    Modify,
    CreateTable,
    CreateSchema,
    CreateView,
    Manage,
}

/// Who a grant's `principal_ref` names: a user, a service principal, or a
/// group. Group membership expansion is the repository's job (see
/// `lattice_repository::GrantRepository`); this type only records the
/// reference as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalRef(pub String);

impl From<&str> for PrincipalRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PrincipalRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// `(principal_ref, securable_ref, privilege)`.
///
/// Effective privileges for a principal are the union over the principal
/// itself and every group transitively containing it — that expansion is a
/// repository concern, not represented in this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeGrant {
    pub id: GrantId,
    pub principal_ref: PrincipalRef,
    pub securable_ref: SecurableId,
    pub privilege: Privilege,
}

impl PrivilegeGrant {
    pub fn new(
        principal_ref: impl Into<PrincipalRef>,
        securable_ref: SecurableId,
        privilege: Privilege,
    ) -> Self {
        Self {
            id: GrantId::new(),
            principal_ref: principal_ref.into(),
            securable_ref,
            privilege,
        }
    }
}

/// The minimum privilege a classification requires on each referenced
/// securable.
pub fn minimum_privilege_for(classification: crate::rewrite::SqlClassification) -> Option<Privilege> {
    use crate::rewrite::SqlClassification::*;
    match classification {
        Read => Some(Privilege::Select),
        Write => Some(Privilege::Modify),
        Ddl => None, // CREATE_* varies by statement; resolved by the rewriter per-statement.
        Utility => None,
    }
}
