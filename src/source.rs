//! Byte sources that can be uploaded.
use std::io::{self, Cursor, SeekFrom};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::UNIX_EPOCH;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt as _, ReadBuf};

/// A seekable, readable source of bytes to upload.
///
/// Uploads seek back and forth: once to measure and digest the source, then
/// once per part. A source that cannot seek has to be read into memory first,
/// see [`materialize`](crate::digest::materialize).
pub trait ByteSource: AsyncRead + AsyncSeek + Unpin + Send {
    /// Modification time in milliseconds since the epoch, if known.
    ///
    /// When present it is recorded on the uploaded object as the
    /// `src_last_modified_millis` file info.
    fn last_modified_millis(&self) -> Option<i64> {
        None
    }
}

impl<T> ByteSource for Cursor<T> where T: AsRef<[u8]> + Unpin + Send {}

impl ByteSource for File {}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn last_modified_millis(&self) -> Option<i64> {
        (**self).last_modified_millis()
    }
}

/// A file on disk that knows its modification time.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    last_modified: Option<i64>,
}

impl FileSource {
    /// Open the file at `path` for reading.
    pub async fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path).await?;
        let last_modified = file
            .metadata()
            .await?
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .and_then(|d| i64::try_from(d.as_millis()).ok());
        Ok(Self {
            file,
            last_modified,
        })
    }
}

impl AsyncRead for FileSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl AsyncSeek for FileSource {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.file).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.file).poll_complete(cx)
    }
}

impl ByteSource for FileSource {
    fn last_modified_millis(&self) -> Option<i64> {
        self.last_modified
    }
}

/// Returns the current position of `source` and the number of bytes from
/// there to the end, leaving the position unchanged.
pub(crate) async fn measure<S>(source: &mut S) -> io::Result<(u64, u64)>
where
    S: AsyncSeek + Unpin + ?Sized,
{
    let start = source.stream_position().await?;
    let end = source.seek(SeekFrom::End(0)).await?;
    source.seek(SeekFrom::Start(start)).await?;
    Ok((start, end.saturating_sub(start)))
}
