//! The authenticated caller a request or background operation runs as.

use serde::{Deserialize, Serialize};

/// Tag distinguishing human users from service principals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalType {
    User,
    ServicePrincipal,
}

/// A principal's identity, propagated implicitly via the operation context.
///
/// Created by an external provisioner (the auth middleware, out of scope
/// here) and immutable within a request's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    pub display_name: String,
    pub principal_type: PrincipalType,
    pub is_admin: bool,
}

impl Principal {
    pub fn new(name: impl Into<String>, principal_type: PrincipalType, is_admin: bool) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            principal_type,
            is_admin,
        }
    }

    pub fn admin(name: impl Into<String>) -> Self {
        Self::new(name, PrincipalType::User, true)
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self::new(name, PrincipalType::User, false)
    }

    pub fn service(name: impl Into<String>) -> Self {
        Self::new(name, PrincipalType::ServicePrincipal, false)
    }
}
