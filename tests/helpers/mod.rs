pub mod fake;
pub use self::fake::{Call, FakeB2};

use b2_transfer::{B2Client, ClientBuilder, Credentials, RetryPolicy};
use std::sync::{Arc, LazyLock};
use std::{str::FromStr, time::Duration};

pub static TRACER: LazyLock<()> = LazyLock::new(|| {
    let level = std::env::var("LOG_LEVEL")
        .map(|l| tracing::Level::from_str(l.as_str()).unwrap())
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init()
});

pub const KEY_ID: &str = "key-id";
pub const BUCKET_ID: &str = "bucket-id";
pub const BUCKET_NAME: &str = "bucket";

/// Retries that do not slow the tests down.
pub fn fast_retries() -> RetryPolicy {
    RetryPolicy::default()
        .base_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(4))
        .default_retry_after(Duration::from_millis(1))
}

pub fn builder(fake: &Arc<FakeB2>) -> ClientBuilder {
    ClientBuilder::new(Credentials::new(KEY_ID, "app-key"))
        .auth_url(fake::AUTH_URL)
        .transport(Arc::clone(fake))
        .retry_policy(fast_retries())
}

pub fn client(fake: &Arc<FakeB2>) -> B2Client {
    builder(fake).build().unwrap()
}

/// Deterministic content that differs from part to part.
pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|n| (n * 7 % 251) as u8).collect()
}
