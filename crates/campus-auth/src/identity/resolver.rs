//! Session resolution against the portal backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use campus_core::config::IdentityConfig;
use campus_core::{AppError, AppResult};
use campus_entity::{Principal, PrincipalId, RoleSet, SessionToken};

/// Outcome of a successful session lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    /// The principal the token belongs to.
    pub principal: Principal,
    /// A refreshed token, when the backend rotated it.
    pub token: Option<SessionToken>,
}

/// Resolves a stored token into a principal.
#[async_trait]
pub trait SessionResolver: Send + Sync + std::fmt::Debug + 'static {
    /// Look the token up.
    ///
    /// Returns `Ok(None)` when the backend says the viewer is not signed in.
    async fn resolve(&self, token: &SessionToken) -> AppResult<Option<ResolvedSession>>;

    /// Tell the backend the session has ended.
    async fn logout(&self, token: &SessionToken) -> AppResult<()>;
}

/// Session endpoint response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionPayload {
    #[serde(alias = "_id")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    roles: Option<Vec<String>>,
    #[serde(default)]
    college_id: Option<String>,
    #[serde(default)]
    department: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

impl SessionPayload {
    fn into_resolved(self) -> ResolvedSession {
        let (roles, rejected) = RoleSet::from_names(self.roles.unwrap_or_default());
        if !rejected.is_empty() {
            warn!(
                principal_id = %self.id,
                rejected = ?rejected,
                "Session carried unknown role names; they were ignored"
            );
        }

        ResolvedSession {
            principal: Principal {
                id: PrincipalId::new(self.id),
                name: self.name,
                email: self.email,
                roles,
                college_id: self.college_id,
                department: self.department,
            },
            token: self
                .token
                .map(SessionToken::new)
                .filter(SessionToken::is_usable),
        }
    }
}

/// Resolves sessions over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSessionResolver {
    client: reqwest::Client,
    session_url: String,
    logout_url: String,
}

impl HttpSessionResolver {
    /// Create a resolver from identity configuration.
    pub fn new(config: &IdentityConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| {
                AppError::with_source(
                    campus_core::error::ErrorKind::Configuration,
                    format!("Failed to build HTTP client: {e}"),
                    e,
                )
            })?;

        Ok(Self {
            client,
            session_url: config.session_url(),
            logout_url: config.logout_url(),
        })
    }
}

#[async_trait]
impl SessionResolver for HttpSessionResolver {
    async fn resolve(&self, token: &SessionToken) -> AppResult<Option<ResolvedSession>> {
        let response = self
            .client
            .get(&self.session_url)
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| AppError::external_service(format!("Session request failed: {e}")))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!(status = %response.status(), "Session endpoint reports no session");
                Ok(None)
            }
            status if status.is_success() => {
                let payload: SessionPayload = response.json().await.map_err(|e| {
                    AppError::external_service(format!("Malformed session response: {e}"))
                })?;
                Ok(Some(payload.into_resolved()))
            }
            status => Err(AppError::external_service(format!(
                "Session endpoint returned {status}"
            ))),
        }
    }

    async fn logout(&self, token: &SessionToken) -> AppResult<()> {
        let response = self
            .client
            .post(&self.logout_url)
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| AppError::external_service(format!("Logout request failed: {e}")))?;

        if response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            Err(AppError::external_service(format!(
                "Logout endpoint returned {}",
                response.status()
            )))
        }
    }
}
