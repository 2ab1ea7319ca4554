//! Core library for the Spectrum Player.
//!
//! Two pieces make up the real-time pipeline. The [`analysis`] module turns
//! raw PCM buffers into windowed magnitude spectra on a dedicated worker
//! thread. The [`playback`] module owns transport state, wires the render tap
//! of the external media framework to that worker and publishes transport,
//! progress and spectrum events to subscribers.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod timeline;

pub use analysis::{
    AnalysisWindow, Spectrum, SpectrumEngine, SpectrumFrame, SpectrumWorker, WorkerHandle,
    WorkerStats,
};
pub use audio::{ItemId, MediaBackend, MediaEvent, MediaItem, MediaLocator, PcmBuffer};
pub use config::{AnalysisConfig, AppConfig, MagnitudeScale, PlaybackConfig, ViewConfig};
pub use error::{Result, SpectrumError};
pub use playback::{
    EventBus, MediaEventSender, PlaybackCoordinator, PlayerEvent, RenderTap, StopReason,
    TrackContext, TrackProvider, TransportState,
};
pub use timeline::{time_for_progress, PlaybackClock};
