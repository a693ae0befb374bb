//! Client-credentials token provider.

use async_trait::async_trait;
use mailpull_core::config::GraphSettings;
use mailpull_core::source::{AuthError, CredentialProvider};
use reqwest::Client;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::token::{ErrorResponse, Token, TokenResponse};
use crate::GRAPH_SCOPE;

/// Issues app-only tokens with the `OAuth2` client-credentials grant.
///
/// Tokens are cached per scope set until 60 seconds before they expire.
pub struct ClientCredentialsProvider {
    client_id: String,
    client_secret: String,
    token_url: Url,
    http_client: Client,
    cache: Mutex<Option<(String, Token)>>,
}

impl ClientCredentialsProvider {
    /// Creates a provider for `{authority_host}/{tenant_id}/oauth2/v2.0/token`.
    ///
    /// # Errors
    ///
    /// Returns an error if any argument is empty or the URL is invalid.
    pub fn new(
        authority_host: &str,
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        if tenant_id.trim().is_empty() || client_id.trim().is_empty() || client_secret.is_empty() {
            return Err(Error::InvalidConfig(
                "tenant id, client id and client secret are required".to_string(),
            ));
        }

        let token_url = Url::parse(&format!(
            "{}/{}/oauth2/v2.0/token",
            authority_host.trim().trim_end_matches('/'),
            tenant_id.trim()
        ))?;

        Ok(Self {
            client_id,
            client_secret,
            token_url,
            http_client: Client::new(),
            cache: Mutex::new(None),
        })
    }

    /// Creates a provider from the `graph` config section.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are incomplete.
    pub fn from_settings(settings: &GraphSettings) -> Result<Self> {
        Self::new(
            &settings.authority_host,
            &settings.tenant_id,
            settings.client_id.clone(),
            settings.client_secret.clone(),
        )
    }

    /// Token endpoint URL.
    #[must_use]
    pub const fn token_url(&self) -> &Url {
        &self.token_url
    }

    async fn request_token(&self, scope: &str) -> Result<Token> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
        ];

        let response = self
            .http_client
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            return Err(serde_json::from_str::<ErrorResponse>(&body).map_or_else(
                |_| Error::oauth_error(status.as_str(), body.clone()),
                ErrorResponse::into_error,
            ));
        }

        let token_response: TokenResponse = response.json().await?;
        Token::from_response(token_response)
    }
}

impl std::fmt::Debug for ClientCredentialsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentialsProvider")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialProvider for ClientCredentialsProvider {
    async fn credential(
        &self,
        scopes: &[&str],
        cancel: &CancellationToken,
    ) -> std::result::Result<String, AuthError> {
        if cancel.is_cancelled() {
            return Err(AuthError("cancelled".to_string()));
        }

        let scope = if scopes.is_empty() {
            GRAPH_SCOPE.to_string()
        } else {
            scopes.join(" ")
        };

        let mut cache = self.cache.lock().await;
        if let Some((cached_scope, token)) = cache.as_ref() {
            if *cached_scope == scope && token.is_valid() {
                return Ok(token.access_token.clone());
            }
        }

        debug!(scope = %scope, "Requesting access token");
        let token = tokio::select! {
            () = cancel.cancelled() => return Err(AuthError("cancelled".to_string())),
            result = self.request_token(&scope) => result.map_err(|e| AuthError(e.to_string()))?,
        };

        let access_token = token.access_token.clone();
        *cache = Some((scope, token));
        Ok(access_token)
    }
}
