// Authentication manager
// Single active token with serialized acquire and refresh

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::credentials::CredentialStore;
use super::refresh::{self, TokenEndpoint};
use super::types::Token;
use crate::error::{ClientError, Result};
use crate::transport::Transport;

/// Authentication manager
/// Owns the single active token and serializes every acquire/refresh
pub struct AuthManager<T: Transport> {
    /// Credentials used for acquire and as client_id on refresh
    store: CredentialStore,

    /// Token endpoint settings
    endpoint: TokenEndpoint,

    /// Transport shared with the request pipeline
    transport: Arc<T>,

    /// Currently active token (at most one)
    current: RwLock<Option<Arc<Token>>>,

    /// Held for the whole duration of an acquire or refresh
    refresh_lock: Mutex<()>,
}

impl<T: Transport> AuthManager<T> {
    pub fn new(store: CredentialStore, endpoint: TokenEndpoint, transport: Arc<T>) -> Self {
        Self {
            store,
            endpoint,
            transport,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Snapshot of the active token, expired or not
    pub async fn current(&self) -> Option<Arc<Token>> {
        self.current.read().await.clone()
    }

    /// Active token if it is still valid
    async fn valid_token(&self) -> Option<Arc<Token>> {
        let current = self.current.read().await;
        current.as_ref().filter(|t| !t.is_expired()).cloned()
    }

    /// Get a valid token, acquiring or refreshing if necessary
    pub async fn token(&self) -> Result<Arc<Token>> {
        if let Some(token) = self.valid_token().await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have replaced the token while we waited
        if let Some(token) = self.valid_token().await {
            return Ok(token);
        }

        let expired = self.current().await;
        match expired {
            Some(old) if old.refresh_token.is_some() => {
                tracing::debug!(token = %old.redacted(), "Token expired, refreshing");
                self.refresh_locked(&old).await
            }
            _ => self.acquire_locked().await,
        }
    }

    /// Exchange the credentials for a fresh token, replacing the active one
    pub async fn acquire(&self) -> Result<Arc<Token>> {
        let _guard = self.refresh_lock.lock().await;
        self.acquire_locked().await
    }

    /// Replace `old` with a new token
    ///
    /// Uses the refresh string when present and falls back to `acquire`.
    /// If `old` was already replaced by a concurrent caller, the newer token
    /// is returned without contacting the token endpoint.
    pub async fn refresh(&self, old: &Token) -> Result<Arc<Token>> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.valid_token().await {
            if current.access_token != old.access_token {
                tracing::debug!(
                    token = %current.redacted(),
                    "Token already refreshed by another request"
                );
                return Ok(current);
            }
        }

        self.refresh_locked(old).await
    }

    /// Drop the active token if it is still `token`
    pub async fn invalidate(&self, token: &Token) {
        let mut current = self.current.write().await;
        if current
            .as_ref()
            .is_some_and(|t| t.access_token == token.access_token)
        {
            tracing::debug!(token = %token.redacted(), "Invalidating access token");
            *current = None;
        }
    }

    async fn acquire_locked(&self) -> Result<Arc<Token>> {
        let token = refresh::acquire_token(
            self.transport.as_ref(),
            &self.endpoint,
            self.store.credentials(),
        )
        .await?;
        Ok(self.store_token(token).await)
    }

    async fn refresh_locked(&self, old: &Token) -> Result<Arc<Token>> {
        if let Some(ref refresh_string) = old.refresh_token {
            match refresh::refresh_token(
                self.transport.as_ref(),
                &self.endpoint,
                self.store.credentials(),
                refresh_string,
            )
            .await
            {
                Ok(token) => {
                    // Servers that do not rotate refresh tokens omit them
                    let token = Token {
                        refresh_token: token.refresh_token.or_else(|| old.refresh_token.clone()),
                        ..token
                    };
                    return Ok(self.store_token(token).await);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Token refresh failed, re-acquiring with credentials");
                }
            }
        } else {
            tracing::debug!("No refresh token available, re-acquiring with credentials");
        }

        match refresh::acquire_token(
            self.transport.as_ref(),
            &self.endpoint,
            self.store.credentials(),
        )
        .await
        {
            Ok(token) => Ok(self.store_token(token).await),
            Err(e) => {
                *self.current.write().await = None;
                tracing::error!(error = %e, "Token refresh and re-acquire both failed");
                Err(ClientError::AuthenticationFailed(format!(
                    "Token refresh failed: {}",
                    e
                )))
            }
        }
    }

    async fn store_token(&self, token: Token) -> Arc<Token> {
        let token = Arc::new(token);
        *self.current.write().await = Some(token.clone());
        token
    }
}
