//! Token manager
//!
//! Caches short-lived bearer tokens obtained by exchanging a long-lived
//! credential (GitHub PAT, service-account key). Per credential fingerprint:
//!
//! ```text
//! {no token} -> exchanging -> cached -> stale -> exchanging -> ...
//! ```
//!
//! Concurrent callers that arrive while an exchange is in flight await the
//! same shared future, so one exchange serves all of them. Tokens are stale
//! [`EXPIRY_SAFETY_WINDOW_SECS`] seconds before their declared expiry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use crate::error::LlmError;

/// Refresh this many seconds before the declared expiry.
pub const EXPIRY_SAFETY_WINDOW_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
    /// Exchanger-specific extras (e.g. the API endpoint returned alongside a
    /// Copilot token).
    pub endpoint: Option<String>,
}

impl CachedToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expires_at,
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(EXPIRY_SAFETY_WINDOW_SECS) >= self.expires_at
    }
}

/// Exchanges a long-lived credential for a short-lived token.
#[async_trait]
pub trait TokenExchanger: Send + Sync + 'static {
    async fn exchange(&self, credential: &str) -> Result<CachedToken, LlmError>;
}

/// SHA-256 hex of the raw credential; the credential itself is never used as
/// a map key.
pub fn fingerprint(credential: &str) -> String {
    format!("{:x}", Sha256::digest(credential.as_bytes()))
}

type SharedExchange = Shared<BoxFuture<'static, Result<CachedToken, LlmError>>>;

enum Entry {
    Cached(CachedToken),
    Exchanging { generation: u64, exchange: SharedExchange },
}

pub struct TokenManager<X: TokenExchanger> {
    exchanger: Arc<X>,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    generation: Arc<AtomicU64>,
}

impl<X: TokenExchanger> Clone for TokenManager<X> {
    fn clone(&self) -> Self {
        Self {
            exchanger: self.exchanger.clone(),
            entries: self.entries.clone(),
            generation: self.generation.clone(),
        }
    }
}

impl<X: TokenExchanger> TokenManager<X> {
    pub fn new(exchanger: X) -> Self {
        Self {
            exchanger: Arc::new(exchanger),
            entries: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return a valid token for `credential`, exchanging when there is no
    /// fresh cached token.
    pub async fn get_token(&self, credential: &SecretString) -> Result<CachedToken, LlmError> {
        let fp = fingerprint(credential.expose_secret());
        let (generation, exchange) = {
            let mut entries = self.entries.lock().await;
            match entries.get(&fp) {
                Some(Entry::Cached(token)) if !token.is_stale(Utc::now()) => {
                    return Ok(token.clone());
                }
                Some(Entry::Exchanging {
                    generation,
                    exchange,
                }) => (*generation, exchange.clone()),
                _ => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let exchanger = self.exchanger.clone();
                    let raw = credential.expose_secret().to_string();
                    let exchange = async move { exchanger.exchange(&raw).await }
                        .boxed()
                        .shared();
                    tracing::debug!(fingerprint = %&fp[..12], "starting token exchange");
                    entries.insert(
                        fp.clone(),
                        Entry::Exchanging {
                            generation,
                            exchange: exchange.clone(),
                        },
                    );
                    (generation, exchange)
                }
            }
        };

        let result = exchange.await;

        let mut entries = self.entries.lock().await;
        // Only the exchange still registered for this fingerprint may settle
        // it; an invalidation in the meantime wins.
        if let Some(Entry::Exchanging { generation: g, .. }) = entries.get(&fp)
            && *g == generation
        {
            match &result {
                Ok(token) => {
                    entries.insert(fp, Entry::Cached(token.clone()));
                }
                Err(error) => {
                    tracing::warn!(error = %error, "token exchange failed");
                    entries.remove(&fp);
                }
            }
        }
        result
    }

    /// Drop the cached entry so the next `get_token` re-exchanges. Called on
    /// a 401 from the real API call.
    pub async fn invalidate(&self, fingerprint: &str) {
        if self.entries.lock().await.remove(fingerprint).is_some() {
            let short = fingerprint.get(..12).unwrap_or(fingerprint);
            tracing::debug!(fingerprint = %short, "token invalidated");
        }
    }

    pub async fn invalidate_credential(&self, credential: &SecretString) {
        self.invalidate(&fingerprint(credential.expose_secret())).await;
    }

    /// Number of fingerprints with a cached or in-flight token.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
