use super::PartNumber;
use crate::config::DEFAULT_CONTENT_TYPE;
use crate::error::{ErrorRepr, Result};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::ops::Deref;

/// Identifies a stored file version or an unfinished large file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Cow<'static, str>);

impl FileId {
    /// Create a new `FileId`.
    pub fn new<T: Into<Cow<'static, str>>>(id: T) -> Self {
        Self(id.into())
    }
}

impl Deref for FileId {
    type Target = str;

    fn deref(&self) -> &str {
        self.0.deref()
    }
}

impl AsRef<str> for FileId {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Display for FileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl From<String> for FileId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Where an object is uploaded and what it is stored with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    bucket_id: String,
    file_name: String,
    content_type: String,
    file_info: BTreeMap<String, String>,
}

impl UploadTarget {
    /// Upload to `file_name` in the bucket `bucket_id`.
    ///
    /// The content type defaults to `b2/x-auto`, which lets the service pick
    /// one from the file name.
    pub fn new<B, N>(bucket_id: B, file_name: N) -> Self
    where
        B: Into<String>,
        N: Into<String>,
    {
        Self {
            bucket_id: bucket_id.into(),
            file_name: file_name.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            file_info: BTreeMap::new(),
        }
    }

    /// Set the content type.
    pub fn content_type<T: Into<String>>(self, content_type: T) -> Self {
        Self {
            content_type: content_type.into(),
            ..self
        }
    }

    /// Add a custom file info entry.
    pub fn file_info<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.file_info.insert(key.into(), value.into());
        self
    }

    /// The bucket to upload to.
    pub fn bucket_id(&self) -> &str {
        &self.bucket_id
    }

    /// The name of the object.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The content type sent with the object.
    pub fn get_content_type(&self) -> &str {
        &self.content_type
    }

    /// Custom file info entries.
    pub fn get_file_info(&self) -> &BTreeMap<String, String> {
        &self.file_info
    }

    pub(crate) fn set_info(&mut self, key: &str, value: String) {
        self.file_info.insert(key.to_string(), value);
    }

    /// Check what the service would reject anyway.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.bucket_id.is_empty() {
            return Err(ErrorRepr::Invalid("bucket id is empty".into()).into());
        }
        if self.file_name.is_empty() {
            return Err(ErrorRepr::Invalid("file name is empty".into()).into());
        }
        // https://www.backblaze.com/docs/cloud-storage-files
        if self.file_name.len() > 1024 {
            return Err(ErrorRepr::Invalid(format!(
                "file name is {} bytes, more than 1024",
                self.file_name.len()
            ))
            .into());
        }
        Ok(())
    }
}

/// A stored object, or a large file that was started but not finished.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVersion {
    /// Identifies this version.
    pub file_id: FileId,
    /// Name of the object.
    pub file_name: String,
    /// Bucket the object is in.
    pub bucket_id: String,
    /// Owning account.
    #[serde(default)]
    pub account_id: Option<String>,
    /// `upload`, `start`, `hide` or `folder`.
    #[serde(default)]
    pub action: String,
    /// Size in bytes; 0 for an unfinished large file.
    #[serde(default)]
    pub content_length: u64,
    /// SHA-1 of the content, `none` for large files.
    #[serde(default)]
    pub content_sha1: Option<String>,
    /// Content type.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Custom file info.
    #[serde(default)]
    pub file_info: BTreeMap<String, String>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub upload_timestamp: i64,
}

/// Permission to upload parts of one large file.
///
/// A capability can stop working at any time, in which case a new one has
/// to be requested.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPartCapability {
    /// The large file the parts belong to.
    pub file_id: FileId,
    /// URL to upload parts to.
    pub upload_url: String,
    /// Token authorizing uploads to `upload_url`.
    pub authorization_token: String,
}

impl Debug for UploadPartCapability {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadPartCapability")
            .field("file_id", &self.file_id)
            .field("upload_url", &self.upload_url)
            .field("authorization_token", &"<redacted>")
            .finish()
    }
}

/// Permission to upload whole objects to one bucket.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCapability {
    /// The bucket objects are uploaded to.
    pub bucket_id: String,
    /// URL to upload to.
    pub upload_url: String,
    /// Token authorizing uploads to `upload_url`.
    pub authorization_token: String,
}

impl Debug for UploadCapability {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCapability")
            .field("bucket_id", &self.bucket_id)
            .field("upload_url", &self.upload_url)
            .field("authorization_token", &"<redacted>")
            .finish()
    }
}

/// A part as the service recorded it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPart {
    /// The large file this part belongs to.
    pub file_id: FileId,
    /// Number of the part.
    pub part_number: PartNumber,
    /// Size of the part in bytes.
    pub content_length: u64,
    /// Hex SHA-1 of the part.
    pub content_sha1: String,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub upload_timestamp: i64,
}

/// One page of the parts of an unfinished large file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedParts {
    /// Parts in ascending part number order.
    pub parts: Vec<UploadedPart>,
    /// Where the next page starts, if there is one.
    pub next_part_number: Option<PartNumber>,
}

/// A large file that was canceled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledLargeFile {
    /// The canceled file.
    pub file_id: FileId,
    /// Owning account.
    pub account_id: String,
    /// Bucket the file was in.
    pub bucket_id: String,
    /// Name the file would have had.
    pub file_name: String,
}

/// A byte range of an object to download.
///
/// Both `start` and `end` are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    /// Create a range from `start` to `end`, both inclusive.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(ErrorRepr::Invalid(format!("invalid byte range {start}-{end}")).into());
        }
        Ok(Self { start, end })
    }

    /// First byte of the range.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last byte of the range.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub(crate) fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// The content of a downloaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// The bytes of the object, or of the requested range.
    pub bytes: Bytes,
    /// Number of bytes in `bytes`.
    pub content_length: u64,
    /// SHA-1 the service reported for the whole object, if any.
    pub content_sha1: Option<String>,
    /// Content type.
    pub content_type: Option<String>,
    /// Identifies the downloaded version.
    pub file_id: Option<FileId>,
    /// Name of the object.
    pub file_name: Option<String>,
}
