//! Events published by the playback coordinator and the bus that fans them
//! out.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::{ItemId, MediaLocator, Spectrum};

/// Why playback of an item ceased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopReason {
    /// The media framework played the item to its end.
    ReachedEnd,
    /// The media framework could not play the item.
    Failed,
    /// The item is about to be replaced. Sent before the swap.
    MixChanging,
    /// The operator paused playback.
    Paused,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::ReachedEnd => write!(f, "reached end"),
            StopReason::Failed => write!(f, "failed"),
            StopReason::MixChanging => write!(f, "mix changing"),
            StopReason::Paused => write!(f, "paused"),
        }
    }
}

/// Notifications delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    DidStartPlay {
        item: ItemId,
        locator: MediaLocator,
    },
    /// Normalized progress in `[0, 1]`.
    DidChangeProgress(f32),
    DidChangeMix {
        from: Option<ItemId>,
        to: ItemId,
    },
    DidStop(StopReason),
    DidChangeSpectrum {
        item: ItemId,
        spectrum: Arc<Spectrum>,
    },
}

/// Fan-out of [`PlayerEvent`]s to every live receiver of one coordinator.
///
/// Each listener owns an unbounded queue, so a slow subscriber never holds
/// up the owner thread. Listeners whose receiver was dropped are forgotten
/// on the next emission.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<Sender<PlayerEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        let (tx, rx) = unbounded();
        self.listeners().push(tx);
        rx
    }

    /// Returns how many listeners received `event`.
    pub fn emit(&self, event: PlayerEvent) -> usize {
        let mut listeners = self.listeners();
        listeners.retain(|listener| listener.send(event.clone()).is_ok());
        listeners.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners().len()
    }

    // A panicking subscriber thread cannot leave the list half-updated.
    fn listeners(&self) -> MutexGuard<'_, Vec<Sender<PlayerEvent>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.subscriber_count())
            .finish()
    }
}
