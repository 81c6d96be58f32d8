//! Protocol limits and client defaults.
use std::time::Duration;

// https://www.backblaze.com/docs/cloud-storage-large-files
pub(crate) const MAX_LARGE_FILE_SIZE: u64 = 10_000_000_000_000;
pub(crate) const MAX_PART_SIZE: u64 = 5_000_000_000;
pub(crate) const MAX_PART_COUNT: u64 = 10_000;

pub(crate) const API_VERSION_PATH: &str = "/b2api/v2/";
pub(crate) const DEFAULT_AUTH_URL: &str = "https://api.backblazeb2.com";
pub(crate) const DEFAULT_VALIDITY_WINDOW: Duration = Duration::from_secs(86_400);
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub(crate) const DEFAULT_CONTENT_TYPE: &str = "b2/x-auto";
pub(crate) const USER_AGENT: &str = concat!("b2-transfer/", env!("CARGO_PKG_VERSION"));

// Custom file info keys understood by other clients.
pub(crate) const LARGE_FILE_SHA1_INFO: &str = "large_file_sha1";
pub(crate) const LAST_MODIFIED_INFO: &str = "src_last_modified_millis";
