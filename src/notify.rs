//! Fire-and-forget refresh signals for the UI layer.
//!
//! Signals are idempotent hints. Delivery is best effort: a full or
//! disconnected channel drops the signal and counts it.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// What the UI should redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiSignal {
    /// Status indicators only
    RefreshStatus,
    /// Every view, the window content changed
    RefreshAll,
}

#[derive(Debug)]
pub struct UiNotifier {
    sender: Option<Sender<UiSignal>>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl UiNotifier {
    /// Create a notifier with a bounded channel of `capacity` signals.
    pub fn channel(capacity: usize) -> (Self, Receiver<UiSignal>) {
        let (sender, receiver) = bounded(capacity.max(1));
        (
            Self {
                sender: Some(sender),
                sent: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// A notifier that discards everything.
    pub fn disabled() -> Self {
        Self {
            sender: None,
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn notify(&self, signal: UiSignal) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(signal) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(?signal, "UI signal dropped");
            }
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for UiNotifier {
    fn default() -> Self {
        Self::disabled()
    }
}
