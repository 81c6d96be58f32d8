use std::fmt::{self, Debug, Formatter};

/// Where a large upload stands after a part was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes of the source uploaded so far.
    pub bytes_transferred: u64,
    /// Size of the source.
    pub total_bytes: u64,
    /// Number of parts uploaded so far.
    pub parts_uploaded: usize,
}

impl UploadProgress {
    /// Fraction of the source uploaded, from 0.0 to 1.0.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        self.bytes_transferred as f64 / self.total_bytes as f64
    }
}

/// Receives progress updates from large uploads.
///
/// Called once per part, in part number order, from the task driving the
/// upload. Implementations should return quickly.
pub trait ProgressListener: Send + Sync {
    /// Called after a part has been uploaded and recorded.
    fn on_progress(&self, progress: &UploadProgress);
}

/// A [`ProgressListener`] that wraps a closure.
pub struct FnProgress<F>(F);

impl<F> ProgressListener for FnProgress<F>
where
    F: Fn(&UploadProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &UploadProgress) {
        (self.0)(progress)
    }
}

impl<F> Debug for FnProgress<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("FnProgress")
    }
}

/// Create a progress listener from a closure.
pub fn progress_fn<F>(f: F) -> FnProgress<F>
where
    F: Fn(&UploadProgress) + Send + Sync,
{
    FnProgress(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn closure_listener_sees_updates() {
        let seen = Arc::new(AtomicU64::new(0));
        let seen_clone = Arc::clone(&seen);
        let listener = progress_fn(move |p: &UploadProgress| {
            seen_clone.store(p.bytes_transferred, Ordering::SeqCst);
        });

        listener.on_progress(&UploadProgress {
            bytes_transferred: 100,
            total_bytes: 250,
            parts_uploaded: 1,
        });
        assert_eq!(seen.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn fraction() {
        let p = UploadProgress {
            bytes_transferred: 50,
            total_bytes: 200,
            parts_uploaded: 1,
        };
        assert!((p.fraction() - 0.25).abs() < f64::EPSILON);
    }
}
