//! Boundary with the external media framework.
//!
//! The framework decodes and plays media; the coordinator only drives its
//! transport and observes rendered buffers through a [`RenderTap`].

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    playback::{MediaEventSender, RenderTap},
    Result,
};

/// Borrowed view over one render pass of interleaved `f32` samples.
///
/// The render path reuses the underlying memory once the tap returns, so the
/// view must never outlive the call it was handed to.
#[derive(Debug, Clone, Copy)]
pub struct PcmBuffer<'a> {
    samples: &'a [f32],
    channels: u16,
    sample_rate: u32,
}

impl<'a> PcmBuffer<'a> {
    pub fn new(samples: &'a [f32], channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    pub fn mono(samples: &'a [f32], sample_rate: u32) -> Self {
        Self::new(samples, 1, sample_rate)
    }

    pub fn samples(&self) -> &'a [f32] {
        self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of complete frames. A trailing partial frame is ignored.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// A buffer the analyzer cannot read anything from.
    pub fn is_malformed(&self) -> bool {
        self.frames() == 0
    }
}

/// Identity of one loaded media item. Every load gets a fresh id, even when
/// the same locator is loaded twice, so late work for a replaced item can be
/// told apart from work for its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(u64);

impl ItemId {
    /// Allocates an identity no other item in this process has used.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Resource locator understood by the media framework (path, URL, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaLocator(String);

impl MediaLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaLocator {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MediaLocator {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The item currently owned by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub id: ItemId,
    pub locator: MediaLocator,
}

/// Asynchronous notifications raised by the media framework.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    ReachedEnd { item: ItemId },
    Failed { item: ItemId, error: String },
}

/// Decode/playback framework driven by the coordinator.
///
/// All methods are called from the coordinator's owner thread. Natural end
/// and failures are reported through the [`MediaEventSender`] handed to
/// [`MediaBackend::connect`] when the coordinator is built.
pub trait MediaBackend: Send {
    fn connect(&mut self, events: MediaEventSender);

    /// Loads `locator` and associates it with `item`. The item starts paused.
    fn load(&mut self, item: ItemId, locator: &MediaLocator) -> Result<()>;

    /// Releases the resources of the loaded item, if any.
    fn unload(&mut self);

    fn play(&mut self);

    fn pause(&mut self);

    fn seek(&mut self, to: Duration);

    fn current_time(&self) -> Option<Duration>;

    /// Total length of the loaded item, `None` while it is still unknown.
    fn duration(&self) -> Option<Duration>;

    fn install_tap(&mut self, tap: RenderTap);

    /// Detaches the tap. When this returns no render pass may still be
    /// running inside the removed tap.
    fn remove_tap(&mut self);
}
