//! Account authorization: credentials, the cached token, and its refresh.
use crate::error::{ErrorRepr, Result};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeDelta, Utc};
use futures::future::Future;
use serde::Deserialize;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use tokio::sync::Mutex;

mod store;
pub use store::{MemoryTokenStore, TokenStore};

/// Environment variable holding the application key id.
pub const KEY_ID_ENV: &str = "B2_APPLICATION_KEY_ID";
/// Environment variable holding the application key.
pub const KEY_ENV: &str = "B2_APPLICATION_KEY";

/// A long-lived application key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    key_id: String,
    application_key: String,
}

impl Credentials {
    /// Create credentials from a key id and application key.
    pub fn new<I, K>(key_id: I, application_key: K) -> Self
    where
        I: Into<String>,
        K: Into<String>,
    {
        Self {
            key_id: key_id.into(),
            application_key: application_key.into(),
        }
    }

    /// Read credentials from `B2_APPLICATION_KEY_ID` and `B2_APPLICATION_KEY`.
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ErrorRepr::Config(format!("{name} is not set")))
        };
        Ok(Self::new(read(KEY_ID_ENV)?, read(KEY_ENV)?))
    }

    /// The key id, which identifies these credentials in a [`TokenStore`].
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// `base64(key_id:application_key)`, the payload of the `Basic` header.
    pub(crate) fn basic(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.key_id, self.application_key))
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("application_key", &"<redacted>")
            .finish()
    }
}

/// What an account token is allowed to do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allowed {
    /// Capability names such as `writeFiles`.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Bucket the key is restricted to, if any.
    pub bucket_id: Option<String>,
    /// Name of that bucket.
    pub bucket_name: Option<String>,
    /// File name prefix the key is restricted to, if any.
    pub name_prefix: Option<String>,
}

impl Allowed {
    /// Whether the capability `name` was granted.
    pub fn has(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c == name)
    }
}

/// One active account session.
///
/// Created by the authorization exchange and replaced wholesale on refresh.
/// It is only usable while it is younger than the validity window.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationRecord {
    /// Account the key belongs to.
    pub account_id: String,
    /// Account token sent with every API call.
    pub authorization_token: String,
    /// Base URL for API calls.
    pub api_url: String,
    /// Base URL for downloads.
    pub download_url: String,
    /// Granted capabilities.
    pub allowed: Allowed,
    /// Part size the service recommends for large files.
    pub recommended_part_size: u64,
    /// Smallest part allowed, except for the last part of a file.
    pub absolute_minimum_part_size: u64,
    /// When the exchange completed.
    pub issued_at: DateTime<Utc>,
}

impl AuthorizationRecord {
    /// Whether the record has outlived `window` at time `now`.
    pub fn is_stale_at(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        now - self.issued_at >= window
    }

    pub(crate) fn from_response(resp: AuthorizeResponse, issued_at: DateTime<Utc>) -> Self {
        Self {
            account_id: resp.account_id,
            authorization_token: resp.authorization_token,
            api_url: resp.api_url,
            download_url: resp.download_url,
            allowed: resp.allowed,
            recommended_part_size: resp.recommended_part_size,
            absolute_minimum_part_size: resp.absolute_minimum_part_size,
            issued_at,
        }
    }
}

impl Debug for AuthorizationRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRecord")
            .field("account_id", &self.account_id)
            .field("authorization_token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("download_url", &self.download_url)
            .field("allowed", &self.allowed)
            .field("recommended_part_size", &self.recommended_part_size)
            .field("absolute_minimum_part_size", &self.absolute_minimum_part_size)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Body of a successful `b2_authorize_account` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthorizeResponse {
    account_id: String,
    authorization_token: String,
    api_url: String,
    download_url: String,
    #[serde(default)]
    allowed: Allowed,
    recommended_part_size: u64,
    absolute_minimum_part_size: u64,
}

/// Owns the credentials and hands out a live account token.
///
/// Refreshes are linearized: callers that find the cached record stale or
/// missing queue on one lock, and whoever gets it second reuses the record
/// the first one stored instead of repeating the exchange.
pub struct Authorizer {
    credentials: Credentials,
    store: Arc<dyn TokenStore>,
    refresh_lock: Mutex<()>,
    validity_window: TimeDelta,
}

impl Authorizer {
    /// Create a new `Authorizer`.
    pub fn new(
        credentials: Credentials,
        store: Arc<dyn TokenStore>,
        validity_window: TimeDelta,
    ) -> Self {
        Self {
            credentials,
            store,
            refresh_lock: Mutex::new(()),
            validity_window,
        }
    }

    /// The credentials this authorizer exchanges.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The cached record, if there is one and it is not stale.
    pub fn cached(&self) -> Option<Arc<AuthorizationRecord>> {
        self.store
            .get(self.credentials.key_id())
            .filter(|r| !r.is_stale_at(Utc::now(), self.validity_window))
    }

    /// Return a live record, running `exchange` if none is cached.
    ///
    /// If the exchange fails, its error is returned as is and the cache is
    /// left untouched.
    pub async fn current<F, Fut>(&self, exchange: F) -> Result<Arc<AuthorizationRecord>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AuthorizationRecord>>,
    {
        if let Some(record) = self.cached() {
            return Ok(record);
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(record) = self.cached() {
            trace!(key_id = %self.credentials.key_id(), "reusing concurrent authorization");
            return Ok(record);
        }

        self.exchange_and_store(exchange).await
    }

    /// Replace a record whose token the service reported as expired.
    ///
    /// If another caller already replaced it, the newer record is returned
    /// without a second exchange.
    pub async fn refresh<F, Fut>(
        &self,
        expired_token: &str,
        exchange: F,
    ) -> Result<Arc<AuthorizationRecord>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AuthorizationRecord>>,
    {
        let _guard = self.refresh_lock.lock().await;
        if let Some(record) = self.cached() {
            if record.authorization_token != expired_token {
                trace!(key_id = %self.credentials.key_id(), "token already refreshed");
                return Ok(record);
            }
        }

        self.exchange_and_store(exchange).await
    }

    async fn exchange_and_store<F, Fut>(&self, exchange: F) -> Result<Arc<AuthorizationRecord>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AuthorizationRecord>>,
    {
        debug!(key_id = %self.credentials.key_id(), "authorizing account");
        let record = Arc::new(exchange().await?);
        self.store.put(self.credentials.key_id(), Arc::clone(&record));
        debug!(
            key_id = %self.credentials.key_id(),
            account_id = %record.account_id,
            recommended_part_size = record.recommended_part_size,
            "authorized account"
        );
        Ok(record)
    }
}

impl Debug for Authorizer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("credentials", &self.credentials)
            .field("validity_window", &self.validity_window)
            .finish()
    }
}
