//! Last seen global change number

use crate::signal::MutationSignal;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Monotonic gate for change notifications
#[derive(Debug)]
pub struct ChangeWatermark {
    last: AtomicU32,
    signal: MutationSignal,
}

impl ChangeWatermark {
    /// Create a watermark at zero
    pub fn new(signal: MutationSignal) -> Self {
        Self {
            last: AtomicU32::new(0),
            signal,
        }
    }

    /// Current value
    pub fn get(&self) -> u32 {
        self.last.load(Ordering::Acquire)
    }

    /// Move the watermark to `version` if it is strictly ahead
    ///
    /// Returns whether the watermark moved. Concurrent callers racing with
    /// the same version see exactly one `true`.
    pub fn advance(&self, version: u32) -> bool {
        let previous = self.last.fetch_max(version, Ordering::AcqRel);
        if version <= previous {
            return false;
        }

        debug!("Change number advanced {} -> {}", previous, version);
        self.signal.raise();
        true
    }

    /// Overwrite the watermark, raising a mutation only if the value changed
    ///
    /// Unlike [`advance`](Self::advance) this may move backwards; it exists
    /// for operators resetting the change feed position.
    pub fn set(&self, version: u32) -> bool {
        let previous = self.last.swap(version, Ordering::AcqRel);
        if previous == version {
            return false;
        }

        self.signal.raise();
        true
    }

    pub(crate) fn restore(&self, version: u32) {
        self.last.store(version, Ordering::Release);
    }
}
