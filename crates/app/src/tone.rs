//! Simulated media framework that "plays" synthetic sine tones.
//!
//! Locators look like `tone:<hz>` or `tone:<hz>:<seconds>`. A render thread
//! produces stereo blocks in real time, feeds them through the installed tap
//! and reports the end of the item when the tone runs out.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use spectrum_player_core::{
    ItemId, MediaBackend, MediaEventSender, MediaLocator, PcmBuffer, RenderTap, Result,
    SpectrumError,
};

const DEFAULT_SECONDS: f32 = 5.0;
const CHANNELS: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    pub frequency: f32,
    pub seconds: f32,
}

impl ToneSpec {
    pub fn parse(locator: &MediaLocator) -> Result<Self> {
        let mut parts = locator.as_str().split(':');
        if parts.next() != Some("tone") {
            return Err(SpectrumError::media(format!(
                "unsupported locator `{locator}`"
            )));
        }

        let frequency = parse_positive(parts.next(), locator)?;
        let seconds = match parts.next() {
            Some(raw) => parse_positive(Some(raw), locator)?,
            None => DEFAULT_SECONDS,
        };
        if parts.next().is_some() {
            return Err(SpectrumError::media(format!(
                "trailing data in locator `{locator}`"
            )));
        }

        Ok(Self { frequency, seconds })
    }
}

fn parse_positive(raw: Option<&str>, locator: &MediaLocator) -> Result<f32> {
    raw.and_then(|value| value.parse::<f32>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
        .ok_or_else(|| SpectrumError::media(format!("malformed tone locator `{locator}`")))
}

#[derive(Debug)]
struct Loaded {
    item: ItemId,
    spec: ToneSpec,
    total_frames: u64,
}

struct RenderThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct ToneBackend {
    sample_rate: u32,
    block_frames: usize,
    events: Option<MediaEventSender>,
    loaded: Option<Loaded>,
    playing: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
    render: Option<RenderThread>,
}

impl ToneBackend {
    pub fn new(sample_rate: u32, block_frames: usize) -> Self {
        Self {
            sample_rate,
            block_frames: block_frames.max(1),
            events: None,
            loaded: None,
            playing: Arc::new(AtomicBool::new(false)),
            frames_played: Arc::new(AtomicU64::new(0)),
            render: None,
        }
    }

    fn frames_to_time(&self, frames: u64) -> Duration {
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate))
    }
}

impl MediaBackend for ToneBackend {
    fn connect(&mut self, events: MediaEventSender) {
        self.events = Some(events);
    }

    fn load(&mut self, item: ItemId, locator: &MediaLocator) -> Result<()> {
        let spec = ToneSpec::parse(locator)?;
        let total_frames = (spec.seconds * self.sample_rate as f32) as u64;
        tracing::debug!(%item, ?spec, "loaded tone");

        self.playing.store(false, Ordering::SeqCst);
        self.frames_played.store(0, Ordering::SeqCst);
        self.loaded = Some(Loaded {
            item,
            spec,
            total_frames,
        });
        Ok(())
    }

    fn unload(&mut self) {
        self.playing.store(false, Ordering::SeqCst);
        self.loaded = None;
    }

    fn play(&mut self) {
        self.playing.store(true, Ordering::SeqCst);
    }

    fn pause(&mut self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    fn seek(&mut self, to: Duration) {
        if let Some(loaded) = &self.loaded {
            let frame = (to.as_secs_f64() * f64::from(self.sample_rate)) as u64;
            self.frames_played
                .store(frame.min(loaded.total_frames), Ordering::SeqCst);
        }
    }

    fn current_time(&self) -> Option<Duration> {
        self.loaded
            .as_ref()
            .map(|_| self.frames_to_time(self.frames_played.load(Ordering::SeqCst)))
    }

    fn duration(&self) -> Option<Duration> {
        self.loaded
            .as_ref()
            .map(|loaded| self.frames_to_time(loaded.total_frames))
    }

    fn install_tap(&mut self, tap: RenderTap) {
        self.remove_tap();

        let (Some(loaded), Some(events)) = (&self.loaded, &self.events) else {
            tracing::warn!("tap installed without a loaded tone");
            return;
        };

        let renderer = Renderer {
            item: loaded.item,
            frequency: loaded.spec.frequency,
            total_frames: loaded.total_frames,
            sample_rate: self.sample_rate,
            block_frames: self.block_frames,
            playing: self.playing.clone(),
            frames_played: self.frames_played.clone(),
            events: events.clone(),
            tap,
        };
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        match thread::Builder::new()
            .name("tone-render".to_string())
            .spawn(move || renderer.run(&thread_stop))
        {
            Ok(handle) => self.render = Some(RenderThread { stop, handle }),
            Err(err) => {
                events.failed(loaded.item, format!("failed to spawn render thread: {err}"));
            }
        }
    }

    fn remove_tap(&mut self) {
        if let Some(render) = self.render.take() {
            render.stop.store(true, Ordering::SeqCst);
            if render.handle.join().is_err() {
                tracing::warn!("tone render thread panicked");
            }
        }
    }
}

impl Drop for ToneBackend {
    fn drop(&mut self) {
        self.remove_tap();
    }
}

struct Renderer {
    item: ItemId,
    frequency: f32,
    total_frames: u64,
    sample_rate: u32,
    block_frames: usize,
    playing: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
    events: MediaEventSender,
    tap: RenderTap,
}

impl Renderer {
    fn run(self, stop: &AtomicBool) {
        let block_time =
            Duration::from_secs_f64(self.block_frames as f64 / f64::from(self.sample_rate));
        // Reused for every render pass, like a real output buffer.
        let mut block = vec![0.0_f32; self.block_frames * CHANNELS as usize];

        while !stop.load(Ordering::SeqCst) {
            thread::sleep(block_time);
            if !self.playing.load(Ordering::SeqCst) {
                continue;
            }

            let start = self.frames_played.load(Ordering::SeqCst);
            if start >= self.total_frames {
                self.events.reached_end(self.item);
                return;
            }

            let frames = (self.total_frames - start).min(self.block_frames as u64) as usize;
            self.fill(&mut block, start, frames);
            self.tap.process(&PcmBuffer::new(
                &block[..frames * CHANNELS as usize],
                CHANNELS,
                self.sample_rate,
            ));
            self.frames_played
                .store(start + frames as u64, Ordering::SeqCst);
        }
    }

    fn fill(&self, block: &mut [f32], start: u64, frames: usize) {
        let step = 2.0 * PI * f64::from(self.frequency) / f64::from(self.sample_rate);
        for (offset, frame) in block
            .chunks_exact_mut(CHANNELS as usize)
            .take(frames)
            .enumerate()
        {
            let n = (start + offset as u64) as f64;
            frame.fill(0.5 * (step * n).sin() as f32);
        }
    }
}
