//! Session token storage.

use async_trait::async_trait;
use tokio::sync::RwLock;

use campus_core::AppResult;
use campus_entity::SessionToken;

/// Where the current session token is kept between resolutions.
#[async_trait]
pub trait TokenStore: Send + Sync + std::fmt::Debug + 'static {
    /// Load the stored token, if any.
    async fn load(&self) -> AppResult<Option<SessionToken>>;

    /// Replace the stored token.
    async fn save(&self, token: &SessionToken) -> AppResult<()>;

    /// Remove the stored token.
    async fn clear(&self) -> AppResult<()>;
}

/// In-memory token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<SessionToken>>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a token.
    pub fn with_token(token: SessionToken) -> Self {
        Self {
            token: RwLock::new(Some(token)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> AppResult<Option<SessionToken>> {
        Ok(self.token.read().await.clone())
    }

    async fn save(&self, token: &SessionToken) -> AppResult<()> {
        *self.token.write().await = Some(token.clone());
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        *self.token.write().await = None;
        Ok(())
    }
}
