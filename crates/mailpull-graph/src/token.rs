//! Access tokens issued by the identity platform.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Seconds before expiry at which a cached token is considered stale.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// Upper bound on a reported token lifetime.
const MAX_LIFETIME_SECS: u64 = 86_400;

/// Access token with its expiry.
#[derive(Clone)]
pub struct Token {
    /// Access token string.
    pub access_token: String,
    /// Expiration time, if the server reported one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Creates a token from a token endpoint response.
    ///
    /// # Errors
    ///
    /// Returns an error if the response carries no token or is not a bearer
    /// token.
    pub fn from_response(response: TokenResponse) -> Result<Self> {
        if response.access_token.is_empty() {
            return Err(Error::InvalidResponse("empty access token".to_string()));
        }
        if !response.token_type.eq_ignore_ascii_case("bearer") {
            return Err(Error::InvalidResponse(format!(
                "unexpected token type {}",
                response.token_type
            )));
        }
        let expires_at = response.expires_in.map(|secs| {
            let secs = i64::try_from(secs.min(MAX_LIFETIME_SECS)).unwrap_or_default();
            Utc::now() + Duration::seconds(secs)
        });

        Ok(Self {
            access_token: response.access_token,
            expires_at,
        })
    }

    /// Checks if the token is expired (with 60 second buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|exp| Utc::now() + Duration::seconds(EXPIRY_BUFFER_SECS) >= exp)
    }

    /// Returns true if the token is valid (not expired).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_expired()
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expires in seconds.
    pub expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Error response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,
    /// Error description.
    #[serde(default)]
    pub error_description: String,
}

impl ErrorResponse {
    /// Converts to an Error.
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::oauth_error(self.error, self.error_description)
    }
}
