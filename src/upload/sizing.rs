use crate::config::{MAX_PART_COUNT, MAX_PART_SIZE};

/// Decides how large each part of a large file is.
///
/// Parts have the recommended size, except that the last part may be
/// smaller, and a remainder smaller than the minimum part size is folded into
/// the part before it. A remainder exactly the minimum size is its own part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSizing {
    part_size: u64,
    min_part_size: u64,
}

impl PartSizing {
    /// Sizing for an object of `total` bytes.
    ///
    /// The part size is raised above `recommended` when needed to stay within
    /// the part count limit, and is never above the maximum part size.
    pub fn new(recommended: u64, minimum: u64, total: u64) -> Self {
        let needed = total.div_ceil(MAX_PART_COUNT);
        let part_size = recommended
            .max(minimum)
            .max(needed)
            .clamp(1, MAX_PART_SIZE);
        Self {
            part_size,
            min_part_size: minimum,
        }
    }

    /// The size of a full part.
    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// Size of the next part when `remaining` bytes are left.
    pub fn next_part_size(&self, remaining: u64) -> u64 {
        if remaining <= self.part_size {
            return remaining;
        }
        let rest = remaining - self.part_size;
        if rest < self.min_part_size && remaining <= MAX_PART_SIZE {
            remaining
        } else {
            self.part_size
        }
    }

    /// The sizes of all parts of `total` bytes, in order.
    pub fn plan(&self, total: u64) -> Vec<u64> {
        let mut sizes = Vec::new();
        let mut remaining = total;
        while remaining > 0 {
            let size = self.next_part_size(remaining);
            sizes.push(size);
            remaining -= size;
        }
        sizes
    }
}
