//! Bearer credential acquisition.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A credential could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct AuthError(pub String);

/// Issues bearer tokens for the remote API.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Obtain a bearer token valid for `scopes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be issued or `cancel` fires
    /// before it is.
    async fn credential(
        &self,
        scopes: &[&str],
        cancel: &CancellationToken,
    ) -> Result<String, AuthError>;
}

/// A fixed, pre-issued bearer token.
#[derive(Clone)]
pub struct StaticCredential {
    token: String,
}

impl StaticCredential {
    /// Wrap an existing token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredential")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn credential(
        &self,
        _scopes: &[&str],
        cancel: &CancellationToken,
    ) -> Result<String, AuthError> {
        if cancel.is_cancelled() {
            return Err(AuthError("cancelled".to_string()));
        }
        if self.token.is_empty() {
            return Err(AuthError("static token is empty".to_string()));
        }
        Ok(self.token.clone())
    }
}
