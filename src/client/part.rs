use crate::digest::Sha1Digest;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

/// Number we assign to a part when uploading.
///
/// Parts of a large file are numbered from 1 with no gaps, and the digests
/// sent to finish the file have to be in part number order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartNumber(u32);

impl Default for PartNumber {
    fn default() -> Self {
        Self(1)
    }
}

impl PartNumber {
    /// Create a new `PartNumber` from a plain integer.
    ///
    /// New uploads start with part number 1, which is `PartNumber::default()`.
    /// Use [`increment`](PartNumber::increment) to move on to the next part.
    pub fn new(n: u32) -> Self {
        Self(n)
    }

    /// Increment the `PartNumber` by 1, returning the previous part number.
    pub fn increment(&mut self) -> PartNumber {
        self.0 += 1;
        PartNumber(self.0 - 1)
    }
}

impl Deref for PartNumber {
    type Target = u32;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for PartNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "part_{}", self.0)
    }
}

/// The digest of one uploaded part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartDigest {
    /// Number the part was uploaded with.
    pub part_number: PartNumber,
    /// SHA-1 of the part's bytes.
    pub sha1: Sha1Digest,
    /// Size of the part in bytes.
    pub length: u64,
}

impl PartDigest {
    /// Create a new `PartDigest`.
    pub fn new(part_number: PartNumber, sha1: Sha1Digest, length: u64) -> Self {
        Self {
            part_number,
            sha1,
            length,
        }
    }
}

/// Digests of all parts uploaded so far, in part number order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartDigests(Vec<PartDigest>);

impl PartDigests {
    /// Add the digest of the part just uploaded.
    pub fn push(&mut self, part: PartDigest) {
        self.0.push(part);
    }

    /// Returns the number of parts recorded.
    pub fn count(&self) -> usize {
        self.0.len()
    }

    /// Returns the total size in bytes of the parts recorded.
    pub fn size(&self) -> u64 {
        self.0.iter().map(|p| p.length).sum()
    }

    /// Sort the digests in increasing order by part number.
    pub fn sort_ascending(&mut self) {
        self.0.sort_by_key(|p| p.part_number);
    }

    /// Whether the part numbers run 1, 2, 3, ... with no gaps.
    pub fn is_contiguous(&self) -> bool {
        self.0
            .iter()
            .zip(1u32..)
            .all(|(p, n)| *p.part_number == n)
    }

    /// The hex SHA-1 of each part, in order, as the finish call expects.
    pub fn sha1_array(&self) -> Vec<String> {
        self.0.iter().map(|p| p.sha1.to_hex()).collect()
    }
}

impl Deref for PartDigests {
    type Target = [PartDigest];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<PartDigest> for PartDigests {
    fn from_iter<I: IntoIterator<Item = PartDigest>>(iter: I) -> Self {
        let mut digests = Self(iter.into_iter().collect());
        digests.sort_ascending();
        digests
    }
}
