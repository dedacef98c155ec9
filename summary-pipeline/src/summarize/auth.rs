//! Bearer-token exchange and per-run token caching.
//!
//! The credential exchange (client id/secret/realm → bearer token) happens
//! at most once per run under normal conditions. The cached token is shared
//! read-only by concurrent summarization calls and refreshed under a single
//! writer when it expires or the API answers 401.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::context::Credentials;
use crate::errors::{SummarizeError, make_snippet};

#[derive(Debug)]
struct CachedToken {
    bearer: String,
    fetched_at: Instant,
    ttl: Option<Duration>,
}

impl CachedToken {
    fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.fetched_at.elapsed() >= ttl)
    }
}

/// Process-lifetime token slot guarded for concurrent readers.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a valid bearer token, exchanging credentials if the cache is
    /// empty or expired. Concurrent callers racing into the write path
    /// re-check the slot so only one exchange happens.
    pub async fn bearer(
        &self,
        http: &reqwest::Client,
        auth_base: &str,
        creds: &Credentials,
    ) -> Result<String, SummarizeError> {
        if let Some(tok) = self.slot.read().await.as_ref() {
            if !tok.is_expired() {
                return Ok(tok.bearer.clone());
            }
        }

        let mut slot = self.slot.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(tok) = slot.as_ref() {
            if !tok.is_expired() {
                return Ok(tok.bearer.clone());
            }
        }
        let fetched = fetch_token(http, auth_base, creds).await?;
        let bearer = fetched.bearer.clone();
        *slot = Some(fetched);
        Ok(bearer)
    }

    /// Drops the cached token so the next caller re-fetches; used on 401.
    pub async fn invalidate(&self) {
        debug!("bearer token invalidated; next call re-authenticates");
        *self.slot.write().await = None;
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

async fn fetch_token(
    http: &reqwest::Client,
    auth_base: &str,
    creds: &Credentials,
) -> Result<CachedToken, SummarizeError> {
    let url = format!(
        "{}/{}/oidc/oauth/token",
        auth_base.trim_end_matches('/'),
        creds.realm
    );
    debug!(%url, client_id = %creds.client_id, "requesting bearer token");

    let resp = http
        .post(&url)
        .form(&[
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ])
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let snippet = make_snippet(&resp.text().await.unwrap_or_default());
        return Err(SummarizeError::from_status(
            status.as_u16(),
            format!("token exchange failed: {snippet}"),
        ));
    }

    let body: TokenResponse = resp.json().await.map_err(|e| SummarizeError::Permanent {
        status: None,
        reason: format!("malformed token response: {e}"),
    })?;

    info!("bearer token obtained");
    Ok(CachedToken {
        bearer: body.access_token,
        fetched_at: Instant::now(),
        ttl: body.expires_in.map(Duration::from_secs),
    })
}
