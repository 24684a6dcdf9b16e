//! Google OAuth token provider
//!
//! Holds an already-granted refresh token and exchanges it for short-lived
//! access tokens on demand. Capability handlers receive this context at
//! construction; nothing reads credentials from the environment at call time.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{Error, Result};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Seconds of validity left below which a cached token is refreshed early
const EXPIRY_SLACK_SECS: i64 = 60;

/// OAuth client context for Google APIs
pub struct GoogleAuth {
    client: Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    cached: Mutex<Option<CachedToken>>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

impl GoogleAuth {
    /// Create a new auth context from OAuth client credentials
    #[must_use]
    pub fn new(client_id: String, client_secret: String, refresh_token: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            client_id,
            client_secret,
            refresh_token,
            cached: Mutex::new(None),
        }
    }

    /// Current access token, refreshing through the token endpoint if the
    /// cached one is missing or about to expire
    ///
    /// # Errors
    ///
    /// Returns error if the refresh request fails
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if is_fresh(token.expires_at, Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let refreshed = self.refresh().await?;
        let access_token = refreshed.access_token.clone();
        *cached = Some(refreshed);

        Ok(access_token)
    }

    async fn refresh(&self) -> Result<CachedToken> {
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Auth(format!("token refresh failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("token refresh error: {status} - {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("malformed token response: {e}")))?;

        tracing::debug!(expires_in = token.expires_in, "refreshed google access token");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }
}

fn is_fresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at.signed_duration_since(now) > chrono::Duration::seconds(EXPIRY_SLACK_SECS)
}
