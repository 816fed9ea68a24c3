//! Portal role enumeration and role sets.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Roles available in the portal.
///
/// Wire names are lowercase snake case and matched case-sensitively:
/// `"Student"` is not a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// Enrolled student.
    Student,
    /// Teaching staff.
    Faculty,
    /// Department administrator.
    DepartmentAdmin,
    /// Placements cell administrator.
    PlacementsAdmin,
    /// Head administrator of a college.
    HeadAdmin,
}

impl Role {
    /// All roles, in declaration order.
    pub const ALL: [Role; 5] = [
        Role::Student,
        Role::Faculty,
        Role::DepartmentAdmin,
        Role::PlacementsAdmin,
        Role::HeadAdmin,
    ];

    /// Return the canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Faculty => "faculty",
            Self::DepartmentAdmin => "department_admin",
            Self::PlacementsAdmin => "placements_admin",
            Self::HeadAdmin => "head_admin",
        }
    }

    /// Check if this role is one of the administrator roles.
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::DepartmentAdmin | Self::PlacementsAdmin | Self::HeadAdmin
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = campus_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| {
                campus_core::AppError::validation(format!(
                    "Invalid role: '{s}'. Expected one of: student, faculty, \
                     department_admin, placements_admin, head_admin"
                ))
            })
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An ordered set of roles.
///
/// Deserializing drops names that are not roles instead of failing, so a
/// principal with garbage role data ends up with fewer (or no) roles and is
/// denied rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    /// Create an empty role set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Parse role names, returning the set and the names that were rejected.
    pub fn from_names<I, S>(names: I) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        let mut rejected = Vec::new();
        for name in names {
            match name.as_ref().parse::<Role>() {
                Ok(role) => {
                    set.insert(role);
                }
                Err(_) => rejected.push(name.as_ref().to_string()),
            }
        }
        (Self(set), rejected)
    }

    /// Add a role. Returns `false` if it was already present.
    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }

    /// Check membership.
    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    /// Whether any role is shared with `other`.
    pub fn intersects(&self, other: &RoleSet) -> bool {
        !self.0.is_disjoint(&other.0)
    }

    /// Returns `true` if the set holds no roles.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of roles in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate roles in order.
    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    /// Canonical wire names, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(Role::as_str).collect()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Role; N]> for RoleSet {
    fn from(roles: [Role; N]) -> Self {
        roles.into_iter().collect()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names().join(","))
    }
}

impl Serialize for RoleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for RoleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default();
        Ok(Self::from_names(names).0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_is_case_sensitive() {
        assert_eq!("faculty".parse::<Role>().unwrap(), Role::Faculty);
        assert_eq!("head_admin".parse::<Role>().unwrap(), Role::HeadAdmin);
        assert!("Faculty".parse::<Role>().is_err());
        assert!("HEAD_ADMIN".parse::<Role>().is_err());
    }

    #[test]
    fn test_from_names_reports_rejected() {
        let (set, rejected) = RoleSet::from_names(["student", "Student", "dean"]);
        assert_eq!(set, RoleSet::from([Role::Student]));
        assert_eq!(rejected, vec!["Student".to_string(), "dean".to_string()]);
    }

    #[test]
    fn test_intersects_is_any_match() {
        let held = RoleSet::from([Role::Faculty, Role::HeadAdmin]);
        assert!(held.intersects(&RoleSet::from([Role::Faculty])));
        assert!(held.intersects(&RoleSet::from([Role::Student, Role::HeadAdmin])));
        assert!(!held.intersects(&RoleSet::from([Role::Student])));
        assert!(!held.intersects(&RoleSet::new()));
    }

    #[test]
    fn test_deserialize_drops_unknown_and_null() {
        let set: RoleSet = serde_json::from_str(r#"["faculty","ADMIN","faculty"]"#).unwrap();
        assert_eq!(set.names(), vec!["faculty"]);

        let empty: RoleSet = serde_json::from_str("null").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_equality_ignores_order() {
        let a = RoleSet::from([Role::Student, Role::Faculty]);
        let b = RoleSet::from([Role::Faculty, Role::Student]);
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), r#"["student","faculty"]"#);
    }
}
