//! Length and SHA-1 of byte sources, computed in one pass.
//!
//! Seekable sources are read to the end and then put back where they were, so
//! the same source can be sent as a request body afterwards without keeping a
//! second copy. A source that cannot seek has to be read into memory with
//! [`materialize`] first, which costs as much memory as the source is long.
use bytes::Bytes;
use serde::{Serialize, Serializer};
use sha1::{Digest as _, Sha1};
use std::fmt::{self, Debug, Display, Formatter};
use std::io::{self, SeekFrom};
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncSeek, AsyncSeekExt as _};

const READ_BUF_SIZE: usize = 64 * 1024;

/// A SHA-1 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha1Digest([u8; 20]);

impl Sha1Digest {
    /// Parse a digest from 40 hex characters.
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut out = [0u8; 20];
        hex::decode_to_slice(s, &mut out).ok()?;
        Some(Self(out))
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex encoding, as sent on the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn from_hasher(hasher: Sha1) -> Self {
        let mut out = [0u8; 20];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }
}

impl Display for Sha1Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Debug for Sha1Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Sha1Digest({self})")
    }
}

impl Serialize for Sha1Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Length and digest of some content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentDigest {
    /// Number of bytes.
    pub length: u64,
    /// SHA-1 of the bytes.
    pub sha1: Sha1Digest,
    /// Modification time of the source in milliseconds since the epoch, if
    /// the source knows it.
    pub last_modified: Option<i64>,
}

impl ContentDigest {
    /// Set the modification time.
    pub fn with_last_modified(self, last_modified: Option<i64>) -> Self {
        Self {
            last_modified,
            ..self
        }
    }
}

/// Digest an in-memory buffer.
pub fn digest_bytes(buf: &[u8]) -> ContentDigest {
    let mut hasher = Sha1::new();
    hasher.update(buf);
    ContentDigest {
        length: buf.len() as u64,
        sha1: Sha1Digest::from_hasher(hasher),
        last_modified: None,
    }
}

/// Digest a seekable source from its current position to the end.
///
/// Afterwards the source is positioned where it was before the call.
pub async fn digest_source<S>(source: &mut S) -> io::Result<ContentDigest>
where
    S: AsyncRead + AsyncSeek + Unpin + ?Sized,
{
    let start = source.stream_position().await?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut length = 0u64;

    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        length += n as u64;
    }

    source.seek(SeekFrom::Start(start)).await?;
    Ok(ContentDigest {
        length,
        sha1: Sha1Digest::from_hasher(hasher),
        last_modified: None,
    })
}

/// Read exactly `len` bytes from `source`, digesting them as they arrive.
///
/// A source that ends early is an [`io::ErrorKind::UnexpectedEof`] error.
pub async fn read_part<S>(source: &mut S, len: u64) -> io::Result<(Bytes, ContentDigest)>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let len = usize::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "part does not fit in memory"))?;
    let mut data = vec![0u8; len];
    let mut hasher = Sha1::new();
    let mut filled = 0;

    while filled < len {
        let n = source.read(&mut data[filled..]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source ended after {filled} of {len} bytes"),
            ));
        }
        hasher.update(&data[filled..filled + n]);
        filled += n;
    }

    let digest = ContentDigest {
        length: len as u64,
        sha1: Sha1Digest::from_hasher(hasher),
        last_modified: None,
    };
    Ok((Bytes::from(data), digest))
}

/// Read a non-seekable source fully into memory and digest it.
pub async fn materialize<R>(reader: &mut R) -> io::Result<(Bytes, ContentDigest)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut data = Vec::new();
    reader.read_to_end(&mut data).await?;
    let digest = digest_bytes(&data);
    Ok((Bytes::from(data), digest))
}
