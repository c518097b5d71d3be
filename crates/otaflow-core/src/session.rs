//! Data describing the current (or last) update attempt
//!
//! The worker is the only writer. Readers on other threads see values that
//! may be momentarily stale; the cells are never held across a transport
//! call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::request::ImageDescriptor;

const SIZE_UNKNOWN: u64 = u64::MAX;

/// Progress and result of an attempt, published by the worker
#[derive(Debug)]
pub struct UpdateSession {
    progress: AtomicU64,
    total_size: AtomicU64,
    message: RwLock<String>,
    image_descriptor: RwLock<Option<ImageDescriptor>>,
}

impl Default for UpdateSession {
    fn default() -> Self {
        Self {
            progress: AtomicU64::new(0),
            total_size: AtomicU64::new(SIZE_UNKNOWN),
            message: RwLock::new(String::new()),
            image_descriptor: RwLock::new(None),
        }
    }
}

impl UpdateSession {
    /// Bytes transferred so far in the current attempt
    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Acquire)
    }

    /// Total image size, if the transport reported one
    pub fn total_size(&self) -> Option<u64> {
        match self.total_size.load(Ordering::Acquire) {
            SIZE_UNKNOWN => None,
            size => Some(size),
        }
    }

    /// Last error message, empty after a successful attempt
    pub fn message(&self) -> String {
        self.message
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Metadata of the remote image, if known
    pub fn image_descriptor(&self) -> Option<ImageDescriptor> {
        self.image_descriptor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Progress as a percentage of the total size
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> Option<f32> {
        let total = self.total_size().filter(|t| *t > 0)?;
        Some(100.0 * self.progress() as f32 / total as f32)
    }

    /// Reset per-attempt data at the start of an attempt
    ///
    /// The message of the previous attempt is kept until this one finishes.
    pub(crate) fn begin_attempt(&self) {
        self.progress.store(0, Ordering::Release);
        self.total_size.store(SIZE_UNKNOWN, Ordering::Release);
        self.set_image_descriptor(None);
    }

    /// Record bytes read; never moves backwards within an attempt
    pub(crate) fn record_progress(&self, bytes: u64) {
        self.progress.fetch_max(bytes, Ordering::AcqRel);
    }

    pub(crate) fn set_total_size(&self, size: Option<u64>) {
        let raw = size.filter(|s| *s != SIZE_UNKNOWN).unwrap_or(SIZE_UNKNOWN);
        self.total_size.store(raw, Ordering::Release);
    }

    pub(crate) fn set_message(&self, message: impl Into<String>) {
        *self.message.write().unwrap_or_else(PoisonError::into_inner) = message.into();
    }

    pub(crate) fn clear_message(&self) {
        self.message
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub(crate) fn set_image_descriptor(&self, descriptor: Option<ImageDescriptor>) {
        *self
            .image_descriptor
            .write()
            .unwrap_or_else(PoisonError::into_inner) = descriptor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_session_is_empty() {
        let session = UpdateSession::default();

        assert_eq!(session.progress(), 0);
        assert_eq!(session.total_size(), None);
        assert!(session.message().is_empty());
        assert!(session.image_descriptor().is_none());
        assert!(session.percent().is_none());
    }

    #[test]
    fn test_progress_is_monotonic_within_attempt() {
        let session = UpdateSession::default();
        session.record_progress(4096);
        session.record_progress(1024);

        assert_eq!(session.progress(), 4096);

        session.begin_attempt();
        assert_eq!(session.progress(), 0);
    }

    #[test]
    fn test_percent_needs_known_size() {
        let session = UpdateSession::default();
        session.record_progress(250);
        assert!(session.percent().is_none());

        session.set_total_size(Some(1000));
        assert_eq!(session.percent(), Some(25.0));

        session.set_total_size(Some(0));
        assert!(session.percent().is_none());
    }

    #[test]
    fn test_begin_attempt_forgets_total_size_but_keeps_message() {
        let session = UpdateSession::default();
        session.set_total_size(Some(1000));
        session.set_message("transfer failed: timeout");

        session.begin_attempt();

        assert_eq!(session.total_size(), None);
        assert_eq!(session.message(), "transfer failed: timeout");
    }
}
