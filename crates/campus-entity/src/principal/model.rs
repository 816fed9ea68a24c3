//! Principal model.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::role::{Role, RoleSet};

/// Identifier of an authenticated principal as issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(pub String);

impl PrincipalId {
    /// Create an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The authenticated identity and its role/scope attributes.
///
/// A principal is an immutable snapshot of one session resolution; a refresh
/// replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Identity id.
    pub id: PrincipalId,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Roles held by the principal.
    #[serde(default)]
    pub roles: RoleSet,
    /// College scope, if any.
    #[serde(default)]
    pub college_id: Option<String>,
    /// Department scope, if any.
    #[serde(default)]
    pub department: Option<String>,
}

impl Principal {
    /// Create a principal with roles and no scope attributes.
    pub fn new(id: impl Into<String>, roles: RoleSet) -> Self {
        Self {
            id: PrincipalId::new(id),
            name: None,
            email: None,
            roles,
            college_id: None,
            department: None,
        }
    }

    /// Attach college and department scope.
    pub fn with_scope(mut self, college_id: Option<&str>, department: Option<&str>) -> Self {
        self.college_id = college_id.map(str::to_string);
        self.department = department.map(str::to_string);
        self
    }

    /// Attach display attributes.
    pub fn with_display(mut self, name: impl Into<String>, email: Option<String>) -> Self {
        self.name = Some(name.into());
        self.email = email;
        self
    }

    /// Check whether the principal holds a role.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(role)
    }

    /// Whether the principal holds at least one of `required`.
    pub fn has_any_role(&self, required: &RoleSet) -> bool {
        self.roles.intersects(required)
    }
}
