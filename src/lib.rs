#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![cfg_attr(not(feature = "tracing"), allow(unused_variables))]

//! # Description
//!
//! A client for the B2 cloud object storage API that takes care of the
//! parts of a transfer that are easy to get wrong: keeping the account
//! authorization alive, retrying what is safe to retry, and splitting large
//! objects into digested parts.
//!
//! # Examples
//!
//! ```no_run
//! use b2_transfer::source::FileSource;
//! use b2_transfer::{ByteSize, ClientBuilder, Credentials, UploadTarget};
//!
//! # async fn f() -> b2_transfer::Result<()> {
//! /// Credentials are read from `B2_APPLICATION_KEY_ID` and
//! /// `B2_APPLICATION_KEY`.
//! let client = ClientBuilder::new(Credentials::from_env()?)
//!     .part_size(ByteSize::mib(100))
//!     .max_concurrent_parts(4)
//!     .build()?;
//!
//! /// Small files are sent in one request, anything larger than a part as a
//! /// large file.
//! let source = FileSource::open("backup.tar").await?;
//! let target = UploadTarget::new("4a48fe8875c6214145260818", "backups/backup.tar");
//! let file = client.upload(target, source).await?;
//! println!("uploaded {} as {}", file.file_name, file.file_id);
//! #     Ok(())
//! # }
//! ```
//!
//! Large uploads can also be driven step by step, which allows resuming
//! after a failure:
//!
//! ```no_run
//! # use b2_transfer::{B2Client, UploadTarget};
//! # use std::io::Cursor;
//! # async fn f(client: B2Client) -> b2_transfer::Result<()> {
//! let mut session = client.large_upload(UploadTarget::new("bucket-id", "big.bin"));
//! session.start(Cursor::new(vec![0u8; 300 * 1024 * 1024])).await?;
//! while let Err(e) = session.upload_parts().await {
//!     eprintln!("{e}, {} bytes uploaded so far", session.bytes_transferred());
//! #   break;
//! }
//! let file = session.finish().await?;
//! #     Ok(())
//! # }
//! ```
use self::auth::{Authorizer, MemoryTokenStore, TokenStore};
use self::client::UploadSettings;
use self::config::{
    DEFAULT_AUTH_URL, DEFAULT_TIMEOUT, DEFAULT_VALIDITY_WINDOW, MAX_PART_COUNT, MAX_PART_SIZE,
    USER_AGENT,
};
use self::dispatch::Dispatcher;
use self::error::ErrorRepr;
use self::transport::{ReqwestTransport, TransportClient};
use self::upload::ProgressListener;

use chrono::TimeDelta;
use std::sync::Arc;
use std::time::Duration;

pub use bytesize::ByteSize;

#[macro_use]
mod trace;

pub mod auth;
#[doc(inline)]
pub use auth::Credentials;

mod client;
pub use client::{
    B2Client, ByteRange, CancelledLargeFile, Download, FileId, FileVersion, ListedParts,
    PartDigest, PartDigests, PartNumber, UploadCapability, UploadPartCapability, UploadTarget,
    UploadedPart,
};

mod config;
pub mod digest;

pub mod dispatch;
#[doc(inline)]
pub use dispatch::{ApiFailure, FailureCategory, FailureKind, RetryPolicy};

pub mod error;
#[doc(inline)]
pub use error::{Error, ErrorKind, Result};

pub mod source;

pub mod transport;
#[doc(inline)]
pub use transport::Transport;

pub mod upload;
#[doc(inline)]
pub use upload::{LargeUploadSession, SessionState, UploadProgress};

/// Configures and builds a [`B2Client`].
pub struct ClientBuilder {
    credentials: Credentials,
    auth_url: String,
    store: Arc<dyn TokenStore>,
    transport: Option<TransportClient>,
    policy: RetryPolicy,
    timeout: Duration,
    user_agent: String,
    validity_window: Duration,
    uploads: UploadSettings,
}

impl ClientBuilder {
    /// Create a `ClientBuilder` for the account of `credentials`.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            store: Arc::new(MemoryTokenStore::new()),
            transport: None,
            policy: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: USER_AGENT.to_string(),
            validity_window: DEFAULT_VALIDITY_WINDOW,
            uploads: UploadSettings::default(),
        }
    }

    /// Create a `ClientBuilder` with credentials from the environment.
    ///
    /// See [`Credentials::from_env`].
    pub fn from_env() -> Result<Self> {
        Credentials::from_env().map(Self::new)
    }

    /// Set the base URL of the authorization exchange.
    pub fn auth_url<T: Into<String>>(self, url: T) -> Self {
        Self {
            auth_url: url.into(),
            ..self
        }
    }

    /// Set where account authorizations are cached.
    ///
    /// Clients sharing a store share authorizations.
    pub fn token_store<T>(self, store: T) -> Self
    where
        T: TokenStore + 'static,
    {
        Self {
            store: Arc::new(store),
            ..self
        }
    }

    /// Send requests with a custom [`Transport`] instead of the default
    /// `reqwest` client.
    pub fn transport<T>(self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        Self {
            transport: Some(TransportClient::new(transport)),
            ..self
        }
    }

    /// Set the retry policy applied to every request.
    pub fn retry_policy(self, policy: RetryPolicy) -> Self {
        Self { policy, ..self }
    }

    /// Set the timeout of a single HTTP request.
    ///
    /// Has no effect with a custom transport.
    pub fn timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Set the user agent.
    ///
    /// Has no effect with a custom transport.
    pub fn user_agent<T: Into<String>>(self, user_agent: T) -> Self {
        Self {
            user_agent: user_agent.into(),
            ..self
        }
    }

    /// Set how long an account authorization is used before it is renewed.
    pub fn validity_window(self, window: Duration) -> Self {
        Self {
            validity_window: window,
            ..self
        }
    }

    /// Set the size of a part in large uploads, in place of the size the
    /// service recommends.
    ///
    /// Sizes below the minimum the service allows are raised to it when the
    /// upload starts.
    pub fn part_size(mut self, size: ByteSize) -> Self {
        // Clamp to 1 <= part_size <= MAX_PART_SIZE.
        self.uploads.part_size = Some(size.as_u64().clamp(1, MAX_PART_SIZE));
        self
    }

    /// Set the maximum number of parts of a large upload sent at the same
    /// time.
    pub fn max_concurrent_parts(mut self, limit: usize) -> Self {
        self.uploads.max_concurrent_parts = limit.clamp(1, MAX_PART_COUNT as usize);
        self
    }

    /// Set whether large uploads compute the SHA-1 of the whole source and
    /// store it as the `large_file_sha1` file info. On by default.
    ///
    /// This reads the source one extra time.
    pub fn large_file_sha1(mut self, enabled: bool) -> Self {
        self.uploads.large_file_sha1 = enabled;
        self
    }

    /// Set a listener for the progress of large uploads.
    pub fn progress<P>(mut self, listener: P) -> Self
    where
        P: ProgressListener + 'static,
    {
        self.uploads.progress = Some(Arc::new(listener));
        self
    }

    /// Build a [`B2Client`] from this configuration.
    pub fn build(self) -> Result<B2Client> {
        let window = TimeDelta::from_std(self.validity_window)
            .ok()
            .filter(|w| *w > TimeDelta::zero())
            .ok_or_else(|| {
                ErrorRepr::Config(format!(
                    "invalid validity window {:?}",
                    self.validity_window
                ))
            })?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => TransportClient::new(ReqwestTransport::new(self.timeout, &self.user_agent)?),
        };

        let authorizer = Authorizer::new(self.credentials, self.store, window);
        let dispatcher = Dispatcher::new(transport, authorizer, self.policy, self.auth_url);
        Ok(B2Client::new(dispatcher, self.uploads))
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("credentials", &self.credentials)
            .field("auth_url", &self.auth_url)
            .field("transport", &self.transport)
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("validity_window", &self.validity_window)
            .field("uploads", &self.uploads)
            .finish()
    }
}

impl B2Client {
    /// Create a [`ClientBuilder`] for the account of `credentials`.
    pub fn builder(credentials: Credentials) -> ClientBuilder {
        ClientBuilder::new(credentials)
    }
}
