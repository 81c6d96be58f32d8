//! This module contains `B2Client`, the typed surface over the API calls a
//! transfer needs.
use crate::auth::AuthorizationRecord;
use crate::config::{API_VERSION_PATH, LARGE_FILE_SHA1_INFO, LAST_MODIFIED_INFO, MAX_PART_SIZE};
use crate::digest::{ContentDigest, digest_bytes, read_part};
use crate::dispatch::{ApiRequest, Dispatcher, Endpoint, HttpResponse};
use crate::error::{ErrorRepr, Result};
use crate::source::{ByteSource, measure};
use crate::upload::{LargeUploadSession, PartSizing, ProgressListener, SessionState};

use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde_json::json;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

mod part;
pub use part::{PartDigest, PartDigests, PartNumber};

mod types;
pub use types::{
    ByteRange, CancelledLargeFile, Download, FileId, FileVersion, ListedParts, UploadCapability,
    UploadPartCapability, UploadTarget, UploadedPart,
};

// Unreserved characters plus `/`, which separates "folders" in file names.
const FILE_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');
const COMPONENT: &AsciiSet = &FILE_NAME.add(b'/');

pub(crate) fn encode_file_name(name: &str) -> String {
    utf8_percent_encode(name, FILE_NAME).to_string()
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Settings applied to large uploads started from a client.
#[derive(Clone)]
pub(crate) struct UploadSettings {
    pub(crate) max_concurrent_parts: usize,
    pub(crate) part_size: Option<u64>,
    pub(crate) large_file_sha1: bool,
    pub(crate) progress: Option<Arc<dyn ProgressListener>>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_concurrent_parts: 1,
            part_size: None,
            large_file_sha1: true,
            progress: None,
        }
    }
}

impl Debug for UploadSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSettings")
            .field("max_concurrent_parts", &self.max_concurrent_parts)
            .field("part_size", &self.part_size)
            .field("large_file_sha1", &self.large_file_sha1)
            .field("progress", &self.progress.as_ref().map(|_| "ProgressListener"))
            .finish()
    }
}

/// A client for the storage API.
///
/// Cloning is cheap: clones share the connection pool and the cached account
/// authorization. Build one with [`ClientBuilder`](crate::ClientBuilder).
#[derive(Clone)]
pub struct B2Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    dispatcher: Dispatcher,
    uploads: UploadSettings,
}

impl B2Client {
    pub(crate) fn new(dispatcher: Dispatcher, uploads: UploadSettings) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                dispatcher,
                uploads,
            }),
        }
    }

    /// The request pipeline used by this client.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub(crate) fn upload_settings(&self) -> &UploadSettings {
        &self.inner.uploads
    }

    /// Return a live account authorization, authorizing if needed.
    pub async fn authorization(&self) -> Result<Arc<AuthorizationRecord>> {
        self.dispatcher().authorization().await
    }

    /// Begin a large file, returning its unfinished version.
    pub async fn start_large_file(&self, target: &UploadTarget) -> Result<FileVersion> {
        target.validate()?;
        let body = serde_json::to_value(target)
            .map_err(|e| ErrorRepr::Invalid(format!("encoding upload target: {e}")))?;
        let req = ApiRequest::api(Endpoint::StartLargeFile, &body);
        let file: FileVersion = self.dispatcher().execute_json(req).await?;
        debug!(file_id = %file.file_id, file_name = %file.file_name, "started large file");
        Ok(file)
    }

    /// Get a capability to upload parts of the large file `file_id`.
    pub async fn get_upload_part_url(&self, file_id: &FileId) -> Result<UploadPartCapability> {
        let req = ApiRequest::api(Endpoint::GetUploadPartUrl, &json!({ "fileId": file_id }));
        self.dispatcher().execute_json(req).await
    }

    /// Upload one part of a large file.
    ///
    /// `digest` has to be the digest of `body`.
    pub async fn upload_part(
        &self,
        capability: &UploadPartCapability,
        part_number: PartNumber,
        body: Bytes,
        digest: &ContentDigest,
    ) -> Result<UploadedPart> {
        let req = ApiRequest::capability(
            Endpoint::UploadPart,
            &capability.upload_url,
            &capability.authorization_token,
        )
        .header("X-Bz-Part-Number", (*part_number).to_string())
        .header("X-Bz-Content-Sha1", digest.sha1.to_hex())
        .body(body);

        let part: UploadedPart = self.dispatcher().execute_json(req).await?;
        trace!(file_id = %part.file_id, %part_number, size = part.content_length, "uploaded part");
        Ok(part)
    }

    /// Assemble the parts of a large file into the finished object.
    pub async fn finish_large_file(
        &self,
        file_id: &FileId,
        parts: &PartDigests,
    ) -> Result<FileVersion> {
        if !parts.is_contiguous() {
            return Err(ErrorRepr::Invalid(format!(
                "parts of {file_id} are not numbered contiguously from 1"
            ))
            .into());
        }
        let body = json!({ "fileId": file_id, "partSha1Array": parts.sha1_array() });
        let req = ApiRequest::api(Endpoint::FinishLargeFile, &body);
        self.dispatcher().execute_json(req).await
    }

    /// Abort a large file, discarding its parts.
    pub async fn cancel_large_file(&self, file_id: &FileId) -> Result<CancelledLargeFile> {
        let req = ApiRequest::api(Endpoint::CancelLargeFile, &json!({ "fileId": file_id }));
        self.dispatcher().execute_json(req).await
    }

    /// List one page of the parts uploaded to a large file.
    pub async fn list_parts(
        &self,
        file_id: &FileId,
        start_part_number: Option<PartNumber>,
        max_part_count: Option<u32>,
    ) -> Result<ListedParts> {
        let mut body = json!({ "fileId": file_id });
        if let Some(start) = start_part_number {
            body["startPartNumber"] = json!(*start);
        }
        if let Some(max) = max_part_count {
            body["maxPartCount"] = json!(max);
        }
        let req = ApiRequest::api(Endpoint::ListParts, &body);
        self.dispatcher().execute_json(req).await
    }

    /// List all parts uploaded to a large file, following pagination.
    pub async fn list_all_parts(&self, file_id: &FileId) -> Result<Vec<UploadedPart>> {
        let mut parts = Vec::new();
        let mut start = None;
        loop {
            let page = self.list_parts(file_id, start, None).await?;
            parts.extend(page.parts);
            match page.next_part_number {
                Some(next) if start.is_none_or(|s| next > s) => start = Some(next),
                _ => return Ok(parts),
            }
        }
    }

    /// Get a capability to upload whole objects to a bucket.
    pub async fn get_upload_url(&self, bucket_id: &str) -> Result<UploadCapability> {
        let req = ApiRequest::api(Endpoint::GetUploadUrl, &json!({ "bucketId": bucket_id }));
        self.dispatcher().execute_json(req).await
    }

    /// Upload a whole object in a single request.
    ///
    /// If the upload capability turns out to be unusable, a new one is
    /// requested and the upload is tried once more.
    pub async fn upload_file(
        &self,
        target: &UploadTarget,
        body: Bytes,
        digest: &ContentDigest,
    ) -> Result<FileVersion> {
        target.validate()?;
        if digest.length > MAX_PART_SIZE {
            return Err(ErrorRepr::SizeOutOfBounds {
                size: digest.length,
                min: 0,
                max: MAX_PART_SIZE,
            }
            .into());
        }

        let capability = self.get_upload_url(target.bucket_id()).await?;
        match self.send_file(&capability, target, body.clone(), digest).await {
            Err(e) if e.failure_kind().is_some_and(|k| k.invalidates_capability()) => {
                debug!(bucket_id = %target.bucket_id(), error = %e, "upload capability rejected, renewing");
                let capability = self.get_upload_url(target.bucket_id()).await?;
                self.send_file(&capability, target, body, digest).await
            }
            res => res,
        }
    }

    async fn send_file(
        &self,
        capability: &UploadCapability,
        target: &UploadTarget,
        body: Bytes,
        digest: &ContentDigest,
    ) -> Result<FileVersion> {
        let mut req = ApiRequest::capability(
            Endpoint::UploadFile,
            &capability.upload_url,
            &capability.authorization_token,
        )
        .header("X-Bz-File-Name", encode_file_name(target.file_name()))
        .header("Content-Type", target.get_content_type())
        .header("X-Bz-Content-Sha1", digest.sha1.to_hex());

        if let Some(millis) = digest.last_modified {
            req = req.header(format!("X-Bz-Info-{LAST_MODIFIED_INFO}"), millis.to_string());
        }
        for (key, value) in target.get_file_info() {
            req = req.header(format!("X-Bz-Info-{key}"), encode_component(value));
        }

        let file: FileVersion = self.dispatcher().execute_json(req.body(body)).await?;
        debug!(file_id = %file.file_id, file_name = %file.file_name, "uploaded file");
        Ok(file)
    }

    /// Download an object by file id.
    ///
    /// A full download is checked against the SHA-1 the service reports.
    pub async fn download_file_by_id(
        &self,
        file_id: &FileId,
        range: Option<ByteRange>,
    ) -> Result<Download> {
        let path = format!(
            "{}{}?fileId={}",
            API_VERSION_PATH,
            Endpoint::DownloadFileById.name(),
            encode_component(file_id)
        );
        self.download(ApiRequest::download(Endpoint::DownloadFileById, path), range)
            .await
    }

    /// Download an object by bucket name and file name.
    ///
    /// A full download is checked against the SHA-1 the service reports.
    pub async fn download_file_by_name(
        &self,
        bucket_name: &str,
        file_name: &str,
        range: Option<ByteRange>,
    ) -> Result<Download> {
        let path = format!(
            "/file/{}/{}",
            encode_component(bucket_name),
            encode_file_name(file_name)
        );
        self.download(ApiRequest::download(Endpoint::DownloadFileByName, path), range)
            .await
    }

    async fn download(&self, req: ApiRequest, range: Option<ByteRange>) -> Result<Download> {
        let req = match range {
            Some(range) => req.header("Range", range.header_value()),
            None => req,
        };
        let resp = self.dispatcher().execute(req).await?;
        let download = download_from_response(resp);

        if range.is_none() {
            verify_download(&download)?;
        }
        Ok(download)
    }

    /// Create a large upload session for `target`.
    ///
    /// The session uses the concurrency, part size and progress settings of
    /// this client.
    pub fn large_upload<S: ByteSource>(&self, target: UploadTarget) -> LargeUploadSession<S> {
        LargeUploadSession::new(self.clone(), target)
    }

    /// Upload `source` to `target`, picking the method by size.
    ///
    /// A source that fits in one part is sent in a single request; anything
    /// larger becomes a large file. If a large upload fails, the unfinished
    /// file is canceled before the error is returned.
    pub async fn upload<S: ByteSource>(
        &self,
        target: UploadTarget,
        mut source: S,
    ) -> Result<FileVersion> {
        let record = self.authorization().await?;
        let part_size = self
            .upload_settings()
            .part_size
            .unwrap_or(record.recommended_part_size);
        let (_, len) = measure(&mut source).await?;
        let sizing = PartSizing::new(part_size, record.absolute_minimum_part_size, len);

        if len <= sizing.part_size() {
            trace!(file_name = %target.file_name(), len, "uploading in a single request");
            let modified = source.last_modified_millis();
            let (body, digest) = read_part(&mut source, len).await?;
            return self
                .upload_file(&target, body, &digest.with_last_modified(modified))
                .await;
        }

        let mut session = self.large_upload(target);
        let uploaded = match session.start(source).await {
            Ok(()) => session.upload_parts().await,
            Err(e) => Err(e),
        };
        if let Err(e) = uploaded {
            if session.state() != SessionState::Created {
                if let Err(cancel_err) = session.cancel().await {
                    warn!(error = %cancel_err, "canceling failed large upload failed");
                }
            }
            return Err(e);
        }
        session.finish().await
    }
}

impl Debug for B2Client {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("B2Client")
            .field("dispatcher", &self.inner.dispatcher)
            .field("uploads", &self.inner.uploads)
            .finish()
    }
}

fn download_from_response(resp: HttpResponse) -> Download {
    let header = |name: &str| resp.header(name).map(str::to_string);
    let content_sha1 = match resp.header("X-Bz-Content-Sha1") {
        Some("none") | None => {
            resp.header(&format!("X-Bz-Info-{LARGE_FILE_SHA1_INFO}")).map(str::to_string)
        }
        Some(sha1) => Some(sha1.to_string()),
    };
    let file_name = resp
        .header("X-Bz-File-Name")
        .map(|name| percent_decode_str(name).decode_utf8_lossy().into_owned());

    Download {
        content_length: resp.body.len() as u64,
        content_sha1,
        content_type: header("Content-Type"),
        file_id: header("X-Bz-File-Id").map(FileId::from),
        file_name,
        bytes: resp.body,
    }
}

fn verify_download(download: &Download) -> Result<()> {
    let Some(expected) = download.content_sha1.as_deref() else {
        return Ok(());
    };
    let expected = expected.strip_prefix("unverified:").unwrap_or(expected);
    let actual = digest_bytes(&download.bytes).sha1.to_hex();
    if !expected.eq_ignore_ascii_case(&actual) {
        return Err(ErrorRepr::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        }
        .into());
    }
    Ok(())
}
