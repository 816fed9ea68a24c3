//! Route-to-role mapping for the dashboard's protected areas.

use campus_entity::{Role, RoleSet};

/// Maps route prefixes to the roles allowed to view them.
#[derive(Debug, Clone)]
pub struct RoutePolicies {
    /// Prefix → allowed roles.
    rules: Vec<(String, RoleSet)>,
}

impl RoutePolicies {
    /// Creates an empty table: every route is unprotected.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Creates the default dashboard table.
    pub fn new() -> Self {
        let admins: RoleSet = Role::ALL.into_iter().filter(Role::is_admin).collect();

        Self::empty()
            .protect("/student", RoleSet::from([Role::Student]))
            .protect("/faculty", RoleSet::from([Role::Faculty]))
            .protect("/department", RoleSet::from([Role::DepartmentAdmin]))
            .protect("/placements", RoleSet::from([Role::PlacementsAdmin]))
            .protect("/head", RoleSet::from([Role::HeadAdmin]))
            .protect("/admin", admins)
    }

    /// Adds or replaces the rule for a prefix.
    pub fn protect(mut self, prefix: impl Into<String>, roles: RoleSet) -> Self {
        let prefix = normalize(&prefix.into());
        self.rules.retain(|(existing, _)| *existing != prefix);
        self.rules.push((prefix, roles));
        self
    }

    /// Roles required for `path`, from the longest matching prefix.
    ///
    /// `None` means the route is not protected.
    pub fn required_roles(&self, path: &str) -> Option<&RoleSet> {
        let path = normalize(path);
        self.rules
            .iter()
            .filter(|(prefix, _)| matches_prefix(&path, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, roles)| roles)
    }
}

impl Default for RoutePolicies {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Prefix match on whole path segments: `/head` covers `/head/x`, not `/headline`.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}
