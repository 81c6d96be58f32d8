//! Large file uploads.
//!
//! A [`LargeUploadSession`] splits a byte source into parts, uploads them
//! with their SHA-1 digests and then finishes or cancels the large file.
//! Parts already uploaded survive a failed call, so a session that stopped
//! in the middle can be driven forward again with
//! [`upload_parts`](LargeUploadSession::upload_parts), and a large file left
//! behind by an earlier process can be picked up with
//! [`resume`](LargeUploadSession::resume).
use crate::client::{
    B2Client, CancelledLargeFile, FileId, FileVersion, PartDigest, PartDigests, PartNumber,
    UploadPartCapability, UploadTarget, UploadedPart,
};
use crate::config::{LARGE_FILE_SHA1_INFO, LAST_MODIFIED_INFO, MAX_LARGE_FILE_SIZE};
use crate::digest::{ContentDigest, digest_source, read_part};
use crate::error::{Error, ErrorRepr, Result};
use crate::source::{ByteSource, measure};

use bytes::Bytes;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::AsyncSeekExt as _;

mod progress;
pub use progress::{FnProgress, ProgressListener, UploadProgress, progress_fn};

mod sizing;
pub use sizing::PartSizing;

/// The lifecycle stage of a [`LargeUploadSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing has been sent yet.
    Created,
    /// The large file exists and no part has been uploaded.
    Started,
    /// Some parts are uploaded, or an upload of parts failed midway.
    UploadingParts,
    /// Every byte of the source is in an uploaded part.
    PartsComplete,
    /// The large file was assembled into an object.
    Finished,
    /// The large file was canceled.
    Canceled,
}

impl SessionState {
    /// Whether the session can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Canceled)
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::UploadingParts => write!(f, "uploading_parts"),
            Self::PartsComplete => write!(f, "parts_complete"),
            Self::Finished => write!(f, "finished"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// A part read from the source and ready to send.
struct PlannedPart {
    part_number: PartNumber,
    body: Bytes,
    digest: ContentDigest,
}

/// One large file upload.
///
/// Moves through the states of [`SessionState`]:
///
/// * [`start`](Self::start) measures the source, checks its size, begins the
///   large file and gets a capability to upload parts.
/// * [`upload_parts`](Self::upload_parts) uploads parts until the source is
///   exhausted.
/// * [`finish`](Self::finish) assembles the parts into the object.
/// * [`cancel`](Self::cancel) discards the large file instead.
///
/// Operations called in the wrong state fail with an error of kind
/// [`ErrorKind::State`](crate::ErrorKind::State) and change nothing.
pub struct LargeUploadSession<S> {
    client: B2Client,
    target: UploadTarget,
    state: SessionState,
    source: Option<S>,
    file_id: Option<FileId>,
    start_offset: u64,
    total_length: u64,
    bytes_transferred: u64,
    next_part_number: PartNumber,
    part_digests: PartDigests,
    capabilities: Vec<UploadPartCapability>,
    sizing: Option<PartSizing>,
    max_concurrent_parts: usize,
    progress: Option<Arc<dyn ProgressListener>>,
}

impl<S: ByteSource> LargeUploadSession<S> {
    /// Create a session uploading to `target`.
    pub fn new(client: B2Client, target: UploadTarget) -> Self {
        let settings = client.upload_settings();
        let max_concurrent_parts = settings.max_concurrent_parts.max(1);
        let progress = settings.progress.clone();
        Self {
            client,
            target,
            state: SessionState::Created,
            source: None,
            file_id: None,
            start_offset: 0,
            total_length: 0,
            bytes_transferred: 0,
            next_part_number: PartNumber::default(),
            part_digests: PartDigests::default(),
            capabilities: Vec::new(),
            sizing: None,
            max_concurrent_parts,
            progress,
        }
    }

    /// Set the maximum number of parts uploaded at the same time.
    pub fn max_concurrent_parts(self, limit: usize) -> Self {
        Self {
            max_concurrent_parts: limit.max(1),
            ..self
        }
    }

    /// Set a listener notified after every uploaded part.
    pub fn with_progress<P>(self, listener: P) -> Self
    where
        P: ProgressListener + 'static,
    {
        Self {
            progress: Some(Arc::new(listener)),
            ..self
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Where the object is uploaded.
    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    /// Id of the large file, once started.
    pub fn file_id(&self) -> Option<&FileId> {
        self.file_id.as_ref()
    }

    /// Size of the source in bytes, once started.
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Bytes uploaded so far.
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// Number the next part will be uploaded with.
    pub fn next_part_number(&self) -> PartNumber {
        self.next_part_number
    }

    /// Digests of the parts uploaded so far, in order.
    pub fn part_digests(&self) -> &PartDigests {
        &self.part_digests
    }

    /// Begin the large file for `source`.
    ///
    /// The source is uploaded from its current position to its end. A size
    /// below the minimum part size or above the large file limit is rejected
    /// before anything is sent and leaves the session `Created`.
    ///
    /// Once the service has begun the large file the session is `Started`,
    /// even if getting the first part capability then fails, so that the file
    /// can still be canceled.
    pub async fn start(&mut self, mut source: S) -> Result<()> {
        self.expect_state("start", &[SessionState::Created])?;
        self.target.validate()?;

        let record = self.client.authorization().await?;
        let (start_offset, total_length) = measure(&mut source).await?;
        let minimum = record.absolute_minimum_part_size;
        check_size(total_length, minimum)?;

        let mut target = self.target.clone();
        if let Some(millis) = source.last_modified_millis() {
            target.set_info(LAST_MODIFIED_INFO, millis.to_string());
        }
        if self.client.upload_settings().large_file_sha1 {
            let digest = digest_source(&mut source).await?;
            target.set_info(LARGE_FILE_SHA1_INFO, digest.sha1.to_hex());
        }

        let file = self
            .client
            .start_large_file(&target)
            .await
            .map_err(ErrorRepr::from_start_err(target.file_name()))?;

        let part_size = self
            .client
            .upload_settings()
            .part_size
            .unwrap_or(record.recommended_part_size);
        self.sizing = Some(PartSizing::new(part_size, minimum, total_length));
        self.target = target;
        self.source = Some(source);
        self.start_offset = start_offset;
        self.total_length = total_length;
        self.file_id = Some(file.file_id.clone());
        self.transition(SessionState::Started);

        let capability = self
            .client
            .get_upload_part_url(&file.file_id)
            .await
            .map_err(ErrorRepr::from_start_err(self.target.file_name()))?;
        self.capabilities.push(capability);
        Ok(())
    }

    /// Upload the remaining parts of the source.
    ///
    /// On failure the parts uploaded before the failing one are kept and the
    /// session stays `UploadingParts`; calling this again continues with the
    /// failed part. The error says which part failed.
    pub async fn upload_parts(&mut self) -> Result<()> {
        self.expect_state(
            "upload parts of",
            &[SessionState::Started, SessionState::UploadingParts],
        )?;
        let file_id = self.require_file_id()?;
        let sizing = self
            .sizing
            .ok_or(ErrorRepr::Missing("LargeUploadSession", "sizing"))?;

        if self.state == SessionState::Started {
            self.transition(SessionState::UploadingParts);
        }

        while self.bytes_transferred < self.total_length {
            let batch = self.read_batch(&file_id, &sizing).await?;
            self.upload_batch(&file_id, batch).await?;
        }

        self.transition(SessionState::PartsComplete);
        Ok(())
    }

    /// Assemble the uploaded parts into the finished object.
    ///
    /// If the service rejects the request the session stays `PartsComplete`.
    pub async fn finish(&mut self) -> Result<FileVersion> {
        self.expect_state("finish", &[SessionState::PartsComplete])?;
        let file_id = self.require_file_id()?;

        let file = self
            .client
            .finish_large_file(&file_id, &self.part_digests)
            .await
            .map_err(ErrorRepr::from_finish_err(&file_id, self.part_digests.count()))?;

        self.transition(SessionState::Finished);
        self.release();
        Ok(file)
    }

    /// Cancel the large file, discarding the uploaded parts.
    ///
    /// Only a large file that was started and not yet finished or canceled
    /// can be canceled.
    pub async fn cancel(&mut self) -> Result<CancelledLargeFile> {
        self.expect_state(
            "cancel",
            &[
                SessionState::Started,
                SessionState::UploadingParts,
                SessionState::PartsComplete,
            ],
        )?;
        let file_id = self.require_file_id()?;

        let canceled = self
            .client
            .cancel_large_file(&file_id)
            .await
            .map_err(ErrorRepr::from_cancel_err(&file_id))?;

        self.transition(SessionState::Canceled);
        self.release();
        Ok(canceled)
    }

    /// Continue the unfinished large file `file_id` with `source`.
    ///
    /// `source` has to be the same content the large file was started with.
    /// Parts already on the service are kept as long as they run from part 1
    /// without gaps and match the size and SHA-1 of the corresponding bytes
    /// of the source; uploading continues after the last such part.
    pub async fn resume(&mut self, file_id: FileId, mut source: S) -> Result<()> {
        self.expect_state("resume", &[SessionState::Created])?;

        let record = self.client.authorization().await?;
        let (start_offset, total_length) = measure(&mut source).await?;
        let minimum = record.absolute_minimum_part_size;
        check_size(total_length, minimum)?;

        let part_size = self
            .client
            .upload_settings()
            .part_size
            .unwrap_or(record.recommended_part_size);
        let sizing = PartSizing::new(part_size, minimum, total_length);

        let listed: BTreeMap<PartNumber, UploadedPart> = self
            .client
            .list_all_parts(&file_id)
            .await?
            .into_iter()
            .map(|part| (part.part_number, part))
            .collect();

        source.seek(SeekFrom::Start(start_offset)).await?;
        let mut next_part_number = PartNumber::default();
        let mut part_digests = PartDigests::default();
        let mut offset = 0;

        while offset < total_length {
            let len = sizing.next_part_size(total_length - offset);
            let Some(uploaded) = listed.get(&next_part_number) else {
                break;
            };
            if uploaded.content_length != len {
                break;
            }
            let (_, digest) = read_part(&mut source, len).await?;
            if !uploaded.content_sha1.eq_ignore_ascii_case(&digest.sha1.to_hex()) {
                break;
            }
            part_digests.push(PartDigest::new(next_part_number.increment(), digest.sha1, len));
            offset += len;
        }

        debug!(
            %file_id,
            listed = listed.len(),
            kept = part_digests.count(),
            offset,
            total_length,
            "resuming large file"
        );

        self.sizing = Some(sizing);
        self.source = Some(source);
        self.start_offset = start_offset;
        self.total_length = total_length;
        self.bytes_transferred = offset;
        self.next_part_number = next_part_number;
        self.part_digests = part_digests;
        self.file_id = Some(file_id.clone());

        if offset == total_length {
            self.transition(SessionState::PartsComplete);
            return Ok(());
        }
        if self.part_digests.count() == 0 {
            self.transition(SessionState::Started);
        } else {
            self.transition(SessionState::UploadingParts);
        }

        let capability = self.client.get_upload_part_url(&file_id).await?;
        self.capabilities.push(capability);
        Ok(())
    }

    /// Read the next parts to upload, up to the concurrency limit.
    async fn read_batch(
        &mut self,
        file_id: &FileId,
        sizing: &PartSizing,
    ) -> Result<Vec<PlannedPart>> {
        let source = self
            .source
            .as_mut()
            .ok_or(ErrorRepr::Missing("LargeUploadSession", "source"))?;

        let mut offset = self.bytes_transferred;
        let mut part_number = self.next_part_number;
        let mut batch = Vec::with_capacity(self.max_concurrent_parts);

        source
            .seek(SeekFrom::Start(self.start_offset + offset))
            .await
            .map_err(|e| ErrorRepr::from_upload_err(file_id, part_number)(e.into()))?;

        while batch.len() < self.max_concurrent_parts && offset < self.total_length {
            let len = sizing.next_part_size(self.total_length - offset);
            let (body, digest) = read_part(source, len)
                .await
                .map_err(|e| ErrorRepr::from_upload_err(file_id, part_number)(e.into()))?;
            batch.push(PlannedPart {
                part_number: part_number.increment(),
                body,
                digest,
            });
            offset += len;
        }

        Ok(batch)
    }

    /// Upload a batch of parts at once, then record the successful ones in
    /// part number order, stopping at the first failure.
    async fn upload_batch(&mut self, file_id: &FileId, batch: Vec<PlannedPart>) -> Result<()> {
        let Some(first) = batch.first().map(|p| p.part_number) else {
            return Ok(());
        };

        while self.capabilities.len() < batch.len() {
            let capability = self
                .client
                .get_upload_part_url(file_id)
                .await
                .map_err(ErrorRepr::from_upload_err(file_id, first))?;
            self.capabilities.push(capability);
        }

        let capabilities: Vec<_> = self.capabilities.drain(..batch.len()).collect();
        let client = &self.client;
        let uploads = batch
            .into_iter()
            .zip(capabilities)
            .map(|(part, capability)| send_part(client, file_id, capability, part));
        let results = join_all(uploads).await;

        let mut failure = None;
        for (capability, result) in results {
            self.capabilities.extend(capability);
            match result {
                Ok(digest) if failure.is_none() => self.commit(digest),
                Ok(_) => {}
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn commit(&mut self, digest: PartDigest) {
        self.bytes_transferred += digest.length;
        self.next_part_number.increment();
        self.part_digests.push(digest);

        trace!(
            file_id = ?self.file_id,
            part = %digest.part_number,
            bytes_transferred = self.bytes_transferred,
            total_length = self.total_length,
            "recorded part"
        );

        if let Some(listener) = &self.progress {
            listener.on_progress(&UploadProgress {
                bytes_transferred: self.bytes_transferred,
                total_bytes: self.total_length,
                parts_uploaded: self.part_digests.count(),
            });
        }
    }

    fn expect_state(&self, op: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(ErrorRepr::InvalidState {
            op,
            state: self.state,
        }
        .into())
    }

    fn require_file_id(&self) -> Result<FileId> {
        self.file_id
            .clone()
            .ok_or_else(|| ErrorRepr::Missing("LargeUploadSession", "file_id").into())
    }

    fn transition(&mut self, to: SessionState) {
        debug!(file_id = ?self.file_id, from = %self.state, %to, "upload session state");
        self.state = to;
    }

    fn release(&mut self) {
        self.source = None;
        self.capabilities.clear();
    }
}

impl<S> Debug for LargeUploadSession<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LargeUploadSession")
            .field("target", &self.target)
            .field("state", &self.state)
            .field("file_id", &self.file_id)
            .field("total_length", &self.total_length)
            .field("bytes_transferred", &self.bytes_transferred)
            .field("next_part_number", &self.next_part_number)
            .field("parts", &self.part_digests.count())
            .field("max_concurrent_parts", &self.max_concurrent_parts)
            .finish()
    }
}

fn check_size(size: u64, min: u64) -> Result<()> {
    if size < min || size > MAX_LARGE_FILE_SIZE {
        return Err(ErrorRepr::SizeOutOfBounds {
            size,
            min,
            max: MAX_LARGE_FILE_SIZE,
        }
        .into());
    }
    Ok(())
}

/// Upload one part, renewing the capability once if the service rejects it.
///
/// Returns the capability for reuse when it is still good.
async fn send_part(
    client: &B2Client,
    file_id: &FileId,
    mut capability: UploadPartCapability,
    part: PlannedPart,
) -> (Option<UploadPartCapability>, Result<PartDigest>) {
    let PlannedPart {
        part_number,
        body,
        digest,
    } = part;
    let context = ErrorRepr::from_upload_err(file_id, part_number);

    let mut res = client.upload_part(&capability, part_number, body.clone(), &digest).await;
    if res.as_ref().is_err_and(invalidates_capability) {
        debug!(%file_id, %part_number, "part capability rejected, renewing");
        capability = match client.get_upload_part_url(file_id).await {
            Ok(fresh) => fresh,
            Err(e) => return (None, Err(context(e))),
        };
        res = client.upload_part(&capability, part_number, body, &digest).await;
    }

    match res {
        Ok(uploaded) if !uploaded.content_sha1.eq_ignore_ascii_case(&digest.sha1.to_hex()) => {
            let mismatch = ErrorRepr::ChecksumMismatch {
                expected: digest.sha1.to_hex(),
                actual: uploaded.content_sha1,
            };
            (Some(capability), Err(context(mismatch.into())))
        }
        Ok(_) => (
            Some(capability),
            Ok(PartDigest::new(part_number, digest.sha1, digest.length)),
        ),
        Err(e) if invalidates_capability(&e) => (None, Err(context(e))),
        Err(e) => (Some(capability), Err(context(e))),
    }
}

fn invalidates_capability(e: &Error) -> bool {
    e.failure_kind().is_some_and(|k| k.invalidates_capability())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(SessionState::Finished.is_terminal());
        assert!(SessionState::Canceled.is_terminal());
        assert!(!SessionState::UploadingParts.is_terminal());
        assert_eq!(SessionState::PartsComplete.to_string(), "parts_complete");
    }

    #[test]
    fn size_bounds() {
        assert!(check_size(100, 100).is_ok());
        assert!(check_size(MAX_LARGE_FILE_SIZE, 100).is_ok());
        let err = check_size(99, 100).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
        assert!(check_size(MAX_LARGE_FILE_SIZE + 1, 100).is_err());
    }
}
