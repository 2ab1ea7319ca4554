use crossbeam_channel::Sender;

use crate::{analysis::WorkerHandle, ItemId, MediaEvent, PcmBuffer, SpectrumFrame};

/// Messages reaching the coordinator from other threads.
#[derive(Debug)]
pub(crate) enum Inbox {
    Spectrum(SpectrumFrame),
    Media(MediaEvent),
}

/// Render-path hook bound to one loaded item.
///
/// [`RenderTap::process`] is safe to call from the audio thread: it copies
/// the buffer into a recycled vector and hands it to the spectrum worker
/// without blocking. Finished frames reach the coordinator through the
/// worker's own completion, so a render pass sets up no callback.
#[derive(Clone)]
pub struct RenderTap {
    item: ItemId,
    worker: WorkerHandle,
}

impl RenderTap {
    pub(crate) fn new(item: ItemId, worker: WorkerHandle) -> Self {
        Self { item, worker }
    }

    pub fn item(&self) -> ItemId {
        self.item
    }

    pub fn process(&self, buffer: &PcmBuffer<'_>) {
        self.worker.submit(self.item, buffer);
    }
}

impl std::fmt::Debug for RenderTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTap").field("item", &self.item).finish()
    }
}

/// Handle the media framework uses to report end of item and failures.
#[derive(Debug, Clone)]
pub struct MediaEventSender {
    inbox: Sender<Inbox>,
}

impl MediaEventSender {
    pub(crate) fn new(inbox: Sender<Inbox>) -> Self {
        Self { inbox }
    }

    pub fn send(&self, event: MediaEvent) {
        let _ = self.inbox.send(Inbox::Media(event));
    }

    pub fn reached_end(&self, item: ItemId) {
        self.send(MediaEvent::ReachedEnd { item });
    }

    pub fn failed(&self, item: ItemId, error: impl Into<String>) {
        self.send(MediaEvent::Failed {
            item,
            error: error.into(),
        });
    }
}
