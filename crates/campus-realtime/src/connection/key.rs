//! Scope key identifying one connection instance.

use campus_auth::Session;
use campus_entity::{RoleSet, SessionToken};

/// `(token, college, department, roles)` a connection was opened with.
///
/// Two keys are equal only when all four parts are; roles compare as sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    /// Bearer token presented to the realtime service.
    pub token: SessionToken,
    /// College scope.
    pub college_id: Option<String>,
    /// Department scope.
    pub department: Option<String>,
    /// Roles the events are scoped to.
    pub roles: RoleSet,
}

impl ScopeKey {
    /// Create a key from its parts.
    pub fn new(
        token: SessionToken,
        college_id: Option<String>,
        department: Option<String>,
        roles: RoleSet,
    ) -> Self {
        Self {
            token,
            college_id,
            department,
            roles,
        }
    }

    /// Key for a resolved session, or `None` if its token cannot be presented.
    pub fn from_session(session: &Session) -> Option<Self> {
        if !session.token.is_usable() {
            return None;
        }
        let principal = &session.principal;
        Some(Self::new(
            session.token.clone(),
            principal.college_id.clone(),
            principal.department.clone(),
            principal.roles.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use campus_entity::{Principal, Role};

    use super::*;

    #[test]
    fn test_from_session_copies_scope() {
        let principal = Principal::new("s1", RoleSet::from([Role::Student]))
            .with_scope(Some("c1"), Some("CSE"));
        let session = Session::new(principal, SessionToken::new("t1"));

        let key = ScopeKey::from_session(&session).unwrap();
        assert_eq!(
            key,
            ScopeKey::new(
                SessionToken::new("t1"),
                Some("c1".into()),
                Some("CSE".into()),
                RoleSet::from([Role::Student]),
            )
        );
    }

    #[test]
    fn test_blank_token_has_no_key() {
        let session = Session::new(
            Principal::new("s1", RoleSet::from([Role::Student])),
            SessionToken::new(""),
        );
        assert!(ScopeKey::from_session(&session).is_none());
    }

    #[test]
    fn test_keys_differ_by_any_part() {
        let base = ScopeKey::new(SessionToken::new("t1"), None, None, RoleSet::from([Role::Faculty]));
        let mut other = base.clone();
        other.department = Some("ECE".into());
        assert_ne!(base, other);

        let mut roles = base.clone();
        roles.roles.insert(Role::HeadAdmin);
        assert_ne!(base, roles);
    }
}
