//! Transport state machine and tap wiring.
//!
//! The coordinator lives on one owner thread and is the single writer of
//! the playback state. Work finishing elsewhere (spectrum frames from the
//! worker, end-of-item and failure reports from the media framework) is
//! posted into an inbox and applied by [`PlaybackCoordinator::dispatch_pending`]
//! or [`PlaybackCoordinator::run_once`], so every [`PlayerEvent`] is emitted
//! from the owner thread.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::{select, tick, unbounded, Receiver};

use crate::{
    timeline::{self, PlaybackClock},
    AppConfig, ItemId, MediaBackend, MediaEvent, MediaItem, MediaLocator, PlaybackConfig, Result,
    SpectrumEngine, SpectrumFrame, SpectrumWorker, WorkerStats,
};

mod events;
mod tap;

pub use events::{EventBus, PlayerEvent, StopReason};
pub use tap::{MediaEventSender, RenderTap};

use tap::Inbox;

/// Where the coordinator is in its transport cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Idle,
    Playing,
    Paused,
    /// Playback of the current item ended; the coordinator is deciding what
    /// comes next.
    Stopped(StopReason),
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Idle => write!(f, "Idle"),
            TransportState::Playing => write!(f, "Playing"),
            TransportState::Paused => write!(f, "Paused"),
            TransportState::Stopped(reason) => write!(f, "Stopped ({reason})"),
        }
    }
}

/// What a [`TrackProvider`] gets to see when asked for a neighbour.
#[derive(Debug, Clone, Copy)]
pub struct TrackContext<'a> {
    pub current: Option<&'a MediaLocator>,
    pub paused: bool,
}

/// Source of the next and previous items, typically a playlist.
pub trait TrackProvider: Send {
    fn next(&mut self, context: &TrackContext<'_>) -> Option<MediaLocator>;

    fn prev(&mut self, context: &TrackContext<'_>) -> Option<MediaLocator>;
}

/// Owns the loaded item, drives the media framework and publishes
/// transport, progress and spectrum events.
pub struct PlaybackCoordinator {
    backend: Box<dyn MediaBackend>,
    provider: Box<dyn TrackProvider>,
    worker: SpectrumWorker,
    bus: EventBus,
    inbox_rx: Receiver<Inbox>,
    ticker: Receiver<Instant>,
    config: PlaybackConfig,
    state: TransportState,
    current: Option<MediaItem>,
    clock: PlaybackClock,
    last_progress: Option<f32>,
    last_stop_reason: Option<StopReason>,
}

impl PlaybackCoordinator {
    /// Builds the spectrum worker and connects `backend` to the inbox.
    pub fn new<B, P>(config: &AppConfig, mut backend: B, provider: P) -> Result<Self>
    where
        B: MediaBackend + 'static,
        P: TrackProvider + 'static,
    {
        config.validate()?;

        let engine =
            SpectrumEngine::with_sample_count(config.analysis.sample_count, config.analysis.scale)?;
        let (inbox_tx, inbox_rx) = unbounded();
        let frames = inbox_tx.clone();
        let worker = SpectrumWorker::spawn(engine, move |frame| {
            let _ = frames.send(Inbox::Spectrum(frame));
        })?;
        backend.connect(MediaEventSender::new(inbox_tx));

        Ok(Self {
            backend: Box::new(backend),
            provider: Box::new(provider),
            worker,
            bus: EventBus::new(),
            inbox_rx,
            ticker: tick(config.playback.progress_interval()),
            config: config.playback.clone(),
            state: TransportState::Idle,
            current: None,
            clock: PlaybackClock::default(),
            last_progress: None,
            last_stop_reason: None,
        })
    }

    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        self.bus.subscribe()
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn paused(&self) -> bool {
        self.state == TransportState::Paused
    }

    pub fn current_item(&self) -> Option<&MediaItem> {
        self.current.as_ref()
    }

    pub fn file_to_play(&self) -> Option<&MediaLocator> {
        self.current.as_ref().map(|item| &item.locator)
    }

    pub fn last_stop_reason(&self) -> Option<StopReason> {
        self.last_stop_reason
    }

    /// Last published normalized progress.
    pub fn progress(&self) -> Option<f32> {
        self.last_progress
    }

    pub fn duration(&self) -> Option<Duration> {
        self.current.as_ref()?;
        self.backend
            .duration()
            .filter(|duration| !duration.is_zero())
            .or_else(|| self.clock.duration())
    }

    pub fn current_time(&self) -> Duration {
        if self.current.is_none() {
            return Duration::ZERO;
        }
        self.backend
            .current_time()
            .unwrap_or_else(|| self.clock.position())
    }

    pub fn current_time_left(&self) -> Option<Duration> {
        self.duration()
            .map(|duration| duration.saturating_sub(self.current_time()))
    }

    /// Offset into the current item for a normalized progress.
    pub fn time_for_progress(&self, progress: f32) -> Duration {
        timeline::time_for_progress(progress, self.duration())
    }

    pub fn worker_stats(&self) -> &WorkerStats {
        self.worker.stats()
    }

    /// Replaces the current item with `locator`, leaving it paused or
    /// playing as requested.
    pub fn set_file_to_play(&mut self, locator: impl Into<MediaLocator>, paused: bool) {
        self.replace_item(locator.into(), paused, true);
    }

    pub fn toggle_play_pause(&mut self) {
        match self.state {
            TransportState::Playing => {
                self.backend.pause();
                self.state = TransportState::Paused;
                tracing::debug!("paused");
                self.publish_stop(StopReason::Paused);
            }
            TransportState::Paused => {
                self.backend.play();
                self.state = TransportState::Playing;
                tracing::debug!("resumed");
            }
            state => tracing::trace!(%state, "nothing to toggle"),
        }
    }

    /// Loads the provider's next item. Returns `false`, leaving playback
    /// untouched, when there is none.
    pub fn play_next(&mut self) -> bool {
        let paused = self.paused();
        let context = TrackContext {
            current: self.current.as_ref().map(|item| &item.locator),
            paused,
        };
        match self.provider.next(&context) {
            Some(locator) => {
                self.replace_item(locator, paused, true);
                true
            }
            None => false,
        }
    }

    /// Loads the provider's previous item. Returns `false`, leaving playback
    /// untouched, when there is none.
    pub fn play_prev(&mut self) -> bool {
        let paused = self.paused();
        let context = TrackContext {
            current: self.current.as_ref().map(|item| &item.locator),
            paused,
        };
        match self.provider.prev(&context) {
            Some(locator) => {
                self.replace_item(locator, paused, true);
                true
            }
            None => false,
        }
    }

    /// Seeks the media framework to the time matching `progress` and
    /// republishes progress.
    pub fn seek_to_progress(&mut self, progress: f32) {
        if self.current.is_none() {
            return;
        }
        let to = self.time_for_progress(progress);
        self.backend.seek(to);
        self.refresh_clock();
        if let Some(progress) = self.clock.progress() {
            self.last_progress = Some(progress);
            self.bus.emit(PlayerEvent::DidChangeProgress(progress));
        }
    }

    /// Recomputes the position and publishes progress while playing. Called
    /// on every tick by [`PlaybackCoordinator::run_once`].
    pub fn publish_progress(&mut self) {
        if self.state != TransportState::Playing {
            return;
        }
        self.refresh_clock();
        match self.clock.progress() {
            Some(progress) => {
                self.last_progress = Some(progress);
                self.bus.emit(PlayerEvent::DidChangeProgress(progress));
            }
            None => tracing::trace!("duration unknown, skipping progress"),
        }
    }

    /// Applies everything already waiting in the inbox without blocking.
    /// Returns the number of messages handled.
    pub fn dispatch_pending(&mut self) -> usize {
        let pending: Vec<Inbox> = self.inbox_rx.try_iter().collect();
        let count = pending.len();
        for message in pending {
            self.handle(message);
        }
        count
    }

    /// Waits up to `timeout` for one inbox message or progress tick and
    /// handles it. Returns `false` if nothing happened.
    pub fn run_once(&mut self, timeout: Duration) -> bool {
        let inbox = self.inbox_rx.clone();
        let ticker = self.ticker.clone();
        select! {
            recv(inbox) -> message => {
                if let Ok(message) = message {
                    self.handle(message);
                }
                true
            }
            recv(ticker) -> _ => {
                self.publish_progress();
                true
            }
            default(timeout) => false,
        }
    }

    fn handle(&mut self, message: Inbox) {
        match message {
            Inbox::Spectrum(frame) => self.publish_spectrum(frame),
            Inbox::Media(event) => self.handle_media_event(event),
        }
    }

    fn publish_spectrum(&mut self, frame: SpectrumFrame) {
        if self.current_id() != Some(frame.item) {
            tracing::trace!(item = %frame.item, "dropping spectrum of a replaced item");
            return;
        }
        self.bus.emit(PlayerEvent::DidChangeSpectrum {
            item: frame.item,
            spectrum: Arc::new(frame.spectrum),
        });
    }

    fn handle_media_event(&mut self, event: MediaEvent) {
        let (item, reason) = match event {
            MediaEvent::ReachedEnd { item } => (item, StopReason::ReachedEnd),
            MediaEvent::Failed { item, error } => {
                tracing::warn!(%item, %error, "playback failed");
                (item, StopReason::Failed)
            }
        };

        if self.current_id() != Some(item) {
            tracing::trace!(%item, %reason, "ignoring media event of a replaced item");
            return;
        }
        self.advance_after_stop(reason);
    }

    fn advance_after_stop(&mut self, reason: StopReason) {
        self.state = TransportState::Stopped(reason);
        self.publish_stop(reason);

        let context = TrackContext {
            current: self.current.as_ref().map(|item| &item.locator),
            paused: false,
        };
        match self.provider.next(&context) {
            Some(locator) => self.replace_item(locator, false, false),
            None => {
                tracing::debug!(%reason, "no next item, going idle");
                self.release_current();
                self.state = TransportState::Idle;
            }
        }
    }

    fn replace_item(&mut self, locator: MediaLocator, paused: bool, announce_stop: bool) {
        let mut item = MediaItem {
            id: ItemId::next(),
            locator,
        };
        let mut failures = 0;

        loop {
            self.bus.emit(PlayerEvent::DidChangeMix {
                from: self.current_id(),
                to: item.id,
            });
            if announce_stop
                && matches!(self.state, TransportState::Playing | TransportState::Paused)
            {
                self.publish_stop(StopReason::MixChanging);
            }
            self.release_current();

            match self.backend.load(item.id, &item.locator) {
                Ok(()) => {
                    self.attach(item, paused);
                    return;
                }
                Err(err) => {
                    tracing::warn!(item = %item.id, locator = %item.locator, %err, "failed to load item");
                    self.state = TransportState::Stopped(StopReason::Failed);
                    self.publish_stop(StopReason::Failed);

                    failures += 1;
                    if failures >= self.config.max_failed_advances {
                        tracing::warn!(failures, "giving up after repeated load failures");
                        self.state = TransportState::Idle;
                        return;
                    }

                    let context = TrackContext {
                        current: Some(&item.locator),
                        paused,
                    };
                    match self.provider.next(&context) {
                        Some(locator) => {
                            item = MediaItem {
                                id: ItemId::next(),
                                locator,
                            };
                        }
                        None => {
                            self.state = TransportState::Idle;
                            return;
                        }
                    }
                }
            }
        }
    }

    fn attach(&mut self, item: MediaItem, paused: bool) {
        self.backend
            .install_tap(RenderTap::new(item.id, self.worker.handle()));
        self.current = Some(item.clone());
        self.refresh_clock();

        if paused {
            self.state = TransportState::Paused;
            tracing::debug!(item = %item.id, locator = %item.locator, "loaded paused");
        } else {
            self.backend.play();
            self.state = TransportState::Playing;
            tracing::debug!(item = %item.id, locator = %item.locator, "started playing");
            self.bus.emit(PlayerEvent::DidStartPlay {
                item: item.id,
                locator: item.locator,
            });
        }
    }

    /// Detaches the tap and unloads the current item. Frames still in
    /// flight for it are dropped on arrival by the identity check.
    fn release_current(&mut self) {
        if let Some(item) = self.current.take() {
            self.backend.remove_tap();
            self.backend.unload();
            tracing::debug!(item = %item.id, "released item");
        }
        self.clock.reset();
        self.last_progress = None;
    }

    fn refresh_clock(&mut self) {
        self.clock
            .update(self.backend.current_time(), self.backend.duration());
    }

    fn publish_stop(&mut self, reason: StopReason) {
        self.last_stop_reason = Some(reason);
        self.bus.emit(PlayerEvent::DidStop(reason));
    }

    fn current_id(&self) -> Option<ItemId> {
        self.current.as_ref().map(|item| item.id)
    }
}

impl Drop for PlaybackCoordinator {
    fn drop(&mut self) {
        self.release_current();
    }
}

impl fmt::Debug for PlaybackCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackCoordinator")
            .field("state", &self.state)
            .field("current", &self.current)
            .field("clock", &self.clock)
            .field("bus", &self.bus)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashSet, VecDeque};
    use std::f32::consts::PI;
    use std::sync::Mutex;

    use super::*;
    use crate::{PcmBuffer, SpectrumError};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Load(MediaLocator),
        Unload,
        Play,
        Pause,
        Seek(Duration),
        InstallTap(ItemId),
        RemoveTap,
    }

    #[derive(Default)]
    struct MockState {
        calls: Vec<Call>,
        tap: Option<RenderTap>,
        events: Option<MediaEventSender>,
        item: Option<ItemId>,
        position: Option<Duration>,
        duration: Option<Duration>,
        broken: HashSet<String>,
    }

    #[derive(Clone, Default)]
    struct MockBackend {
        state: Arc<Mutex<MockState>>,
    }

    impl MockBackend {
        fn calls(&self) -> Vec<Call> {
            self.state.lock().unwrap().calls.clone()
        }

        fn clear_calls(&self) {
            self.state.lock().unwrap().calls.clear();
        }

        fn tap(&self) -> RenderTap {
            self.state.lock().unwrap().tap.clone().expect("tap installed")
        }

        fn has_tap(&self) -> bool {
            self.state.lock().unwrap().tap.is_some()
        }

        fn item(&self) -> ItemId {
            self.state.lock().unwrap().item.expect("item loaded")
        }

        fn events(&self) -> MediaEventSender {
            self.state.lock().unwrap().events.clone().expect("connected")
        }

        fn set_clock(&self, position: Option<Duration>, duration: Option<Duration>) {
            let mut state = self.state.lock().unwrap();
            state.position = position;
            state.duration = duration;
        }

        fn break_locator(&self, locator: &str) {
            self.state.lock().unwrap().broken.insert(locator.to_string());
        }

        fn record(&self, call: Call) {
            self.state.lock().unwrap().calls.push(call);
        }
    }

    impl MediaBackend for MockBackend {
        fn connect(&mut self, events: MediaEventSender) {
            self.state.lock().unwrap().events = Some(events);
        }

        fn load(&mut self, item: ItemId, locator: &MediaLocator) -> Result<()> {
            self.record(Call::Load(locator.clone()));
            let mut state = self.state.lock().unwrap();
            if state.broken.contains(locator.as_str()) {
                return Err(SpectrumError::media(format!("cannot open {locator}")));
            }
            state.item = Some(item);
            state.position = Some(Duration::ZERO);
            Ok(())
        }

        fn unload(&mut self) {
            self.record(Call::Unload);
            self.state.lock().unwrap().item = None;
        }

        fn play(&mut self) {
            self.record(Call::Play);
        }

        fn pause(&mut self) {
            self.record(Call::Pause);
        }

        fn seek(&mut self, to: Duration) {
            self.record(Call::Seek(to));
            self.state.lock().unwrap().position = Some(to);
        }

        fn current_time(&self) -> Option<Duration> {
            self.state.lock().unwrap().position
        }

        fn duration(&self) -> Option<Duration> {
            self.state.lock().unwrap().duration
        }

        fn install_tap(&mut self, tap: RenderTap) {
            self.record(Call::InstallTap(tap.item()));
            self.state.lock().unwrap().tap = Some(tap);
        }

        fn remove_tap(&mut self) {
            self.record(Call::RemoveTap);
            self.state.lock().unwrap().tap = None;
        }
    }

    #[derive(Default)]
    struct ScriptedProvider {
        next: VecDeque<&'static str>,
        prev: VecDeque<&'static str>,
        always_next: Option<&'static str>,
    }

    impl TrackProvider for ScriptedProvider {
        fn next(&mut self, _context: &TrackContext<'_>) -> Option<MediaLocator> {
            self.next
                .pop_front()
                .or(self.always_next)
                .map(MediaLocator::from)
        }

        fn prev(&mut self, _context: &TrackContext<'_>) -> Option<MediaLocator> {
            self.prev.pop_front().map(MediaLocator::from)
        }
    }

    fn quiet_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.analysis.sample_count = 256;
        config.playback.progress_interval_ms = 3_600_000;
        config.playback.max_failed_advances = 3;
        config
    }

    fn coordinator(provider: ScriptedProvider) -> (PlaybackCoordinator, MockBackend) {
        let backend = MockBackend::default();
        let coordinator =
            PlaybackCoordinator::new(&quiet_config(), backend.clone(), provider).unwrap();
        (coordinator, backend)
    }

    fn drain(rx: &Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
        rx.try_iter().collect()
    }

    fn stops(events: &[PlayerEvent]) -> Vec<StopReason> {
        events
            .iter()
            .filter_map(|event| match event {
                PlayerEvent::DidStop(reason) => Some(*reason),
                _ => None,
            })
            .collect()
    }

    fn sine_block() -> Vec<f32> {
        (0..256)
            .map(|n| (2.0 * PI * 16.0 * n as f32 / 256.0).sin())
            .collect()
    }

    fn wait_for_spectrum(
        coordinator: &mut PlaybackCoordinator,
        rx: &Receiver<PlayerEvent>,
        item: ItemId,
    ) -> Vec<PlayerEvent> {
        let deadline = Instant::now() + TIMEOUT;
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            coordinator.run_once(Duration::from_millis(20));
            for event in rx.try_iter() {
                let done = matches!(&event, PlayerEvent::DidChangeSpectrum { item: i, .. } if *i == item);
                seen.push(event);
                if done {
                    return seen;
                }
            }
        }
        panic!("no spectrum for {item} within {TIMEOUT:?}");
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = quiet_config();
        config.analysis.sample_count = 0;
        let err = PlaybackCoordinator::new(
            &config,
            MockBackend::default(),
            ScriptedProvider::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SpectrumError::InvalidConfig(_)));
    }

    #[test]
    fn starts_playing_from_idle() {
        let (mut coordinator, backend) = coordinator(ScriptedProvider::default());
        let rx = coordinator.subscribe();

        coordinator.set_file_to_play("a.mp3", false);

        let item = backend.item();
        assert_eq!(coordinator.state(), TransportState::Playing);
        assert_eq!(coordinator.file_to_play(), Some(&MediaLocator::from("a.mp3")));
        assert_eq!(
            backend.calls(),
            vec![
                Call::Load("a.mp3".into()),
                Call::InstallTap(item),
                Call::Play
            ]
        );
        assert_eq!(
            drain(&rx),
            vec![
                PlayerEvent::DidChangeMix {
                    from: None,
                    to: item
                },
                PlayerEvent::DidStartPlay {
                    item,
                    locator: "a.mp3".into()
                },
            ]
        );
    }

    #[test]
    fn loading_paused_does_not_start_transport() {
        let (mut coordinator, backend) = coordinator(ScriptedProvider::default());
        let rx = coordinator.subscribe();

        coordinator.set_file_to_play("a.mp3", true);

        assert_eq!(coordinator.state(), TransportState::Paused);
        assert!(!backend.calls().contains(&Call::Play));
        assert!(!drain(&rx)
            .iter()
            .any(|event| matches!(event, PlayerEvent::DidStartPlay { .. })));
    }

    #[test]
    fn toggle_publishes_one_stop_when_pausing_and_none_when_resuming() {
        let (mut coordinator, backend) = coordinator(ScriptedProvider::default());
        coordinator.set_file_to_play("a.mp3", false);
        let rx = coordinator.subscribe();
        backend.clear_calls();

        coordinator.toggle_play_pause();
        assert_eq!(coordinator.state(), TransportState::Paused);
        assert_eq!(drain(&rx), vec![PlayerEvent::DidStop(StopReason::Paused)]);
        assert_eq!(coordinator.last_stop_reason(), Some(StopReason::Paused));

        coordinator.toggle_play_pause();
        assert_eq!(coordinator.state(), TransportState::Playing);
        assert!(drain(&rx).is_empty());
        assert_eq!(backend.calls(), vec![Call::Pause, Call::Play]);
    }

    #[test]
    fn toggle_without_item_is_a_no_op() {
        let (mut coordinator, backend) = coordinator(ScriptedProvider::default());
        let rx = coordinator.subscribe();

        coordinator.toggle_play_pause();

        assert_eq!(coordinator.state(), TransportState::Idle);
        assert!(drain(&rx).is_empty());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn replacing_an_item_tears_down_before_attaching() {
        let (mut coordinator, backend) = coordinator(ScriptedProvider::default());
        coordinator.set_file_to_play("a.mp3", false);
        let old = backend.item();
        let rx = coordinator.subscribe();
        backend.clear_calls();

        coordinator.set_file_to_play("b.mp3", false);
        let new = backend.item();

        assert_ne!(old, new);
        assert_eq!(
            backend.calls(),
            vec![
                Call::RemoveTap,
                Call::Unload,
                Call::Load("b.mp3".into()),
                Call::InstallTap(new),
                Call::Play,
            ]
        );
        assert_eq!(
            drain(&rx),
            vec![
                PlayerEvent::DidChangeMix {
                    from: Some(old),
                    to: new
                },
                PlayerEvent::DidStop(StopReason::MixChanging),
                PlayerEvent::DidStartPlay {
                    item: new,
                    locator: "b.mp3".into()
                },
            ]
        );
    }

    #[test]
    fn reached_end_advances_to_next_item() {
        let provider = ScriptedProvider {
            next: VecDeque::from(["b.mp3"]),
            ..Default::default()
        };
        let (mut coordinator, backend) = coordinator(provider);
        coordinator.set_file_to_play("a.mp3", false);
        let old = backend.item();
        let rx = coordinator.subscribe();

        backend.events().reached_end(old);
        assert_eq!(coordinator.dispatch_pending(), 1);

        let new = backend.item();
        let events = drain(&rx);
        assert_eq!(stops(&events), vec![StopReason::ReachedEnd]);
        let stop_at = events
            .iter()
            .position(|event| *event == PlayerEvent::DidStop(StopReason::ReachedEnd))
            .unwrap();
        let start_at = events
            .iter()
            .position(|event| matches!(event, PlayerEvent::DidStartPlay { item, .. } if *item == new))
            .unwrap();
        assert!(stop_at < start_at);
        assert_eq!(coordinator.state(), TransportState::Playing);
        assert_eq!(coordinator.file_to_play(), Some(&MediaLocator::from("b.mp3")));
    }

    #[test]
    fn stale_spectrum_is_never_published_after_advance() {
        let provider = ScriptedProvider {
            next: VecDeque::from(["b.mp3"]),
            ..Default::default()
        };
        let (mut coordinator, backend) = coordinator(provider);
        coordinator.set_file_to_play("a.mp3", false);
        let old = backend.item();
        let old_tap = backend.tap();
        let rx = coordinator.subscribe();

        backend.events().reached_end(old);
        coordinator.dispatch_pending();
        let new = backend.item();

        let samples = sine_block();
        old_tap.process(&PcmBuffer::mono(&samples, 48_000));
        backend.tap().process(&PcmBuffer::mono(&samples, 48_000));

        let events = wait_for_spectrum(&mut coordinator, &rx, new);
        assert!(!events.iter().any(
            |event| matches!(event, PlayerEvent::DidChangeSpectrum { item, .. } if *item == old)
        ));
    }

    #[test]
    fn spectrum_from_current_tap_is_published() {
        let (mut coordinator, backend) = coordinator(ScriptedProvider::default());
        coordinator.set_file_to_play("a.mp3", false);
        let item = backend.item();
        let rx = coordinator.subscribe();

        let samples = sine_block();
        backend.tap().process(&PcmBuffer::mono(&samples, 48_000));

        let events = wait_for_spectrum(&mut coordinator, &rx, item);
        let spectrum = events
            .iter()
            .find_map(|event| match event {
                PlayerEvent::DidChangeSpectrum { spectrum, .. } => Some(spectrum.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(spectrum.len(), 128);
        assert_eq!(spectrum.peak_bin(), Some(16));
    }

    #[test]
    fn end_without_next_item_goes_idle() {
        let (mut coordinator, backend) = coordinator(ScriptedProvider::default());
        coordinator.set_file_to_play("a.mp3", false);
        let rx = coordinator.subscribe();

        backend.events().reached_end(backend.item());
        coordinator.dispatch_pending();

        assert_eq!(coordinator.state(), TransportState::Idle);
        assert!(coordinator.current_item().is_none());
        assert!(!backend.has_tap());
        assert_eq!(drain(&rx), vec![PlayerEvent::DidStop(StopReason::ReachedEnd)]);
    }

    #[test]
    fn failure_advances_with_failed_reason() {
        let provider = ScriptedProvider {
            next: VecDeque::from(["b.mp3"]),
            ..Default::default()
        };
        let (mut coordinator, backend) = coordinator(provider);
        coordinator.set_file_to_play("a.mp3", false);
        let rx = coordinator.subscribe();

        backend.events().failed(backend.item(), "decoder crashed");
        coordinator.dispatch_pending();

        let events = drain(&rx);
        assert_eq!(stops(&events), vec![StopReason::Failed]);
        assert_eq!(coordinator.state(), TransportState::Playing);
        assert_eq!(coordinator.last_stop_reason(), Some(StopReason::Failed));
    }

    #[test]
    fn media_events_for_replaced_items_are_ignored() {
        let (mut coordinator, backend) = coordinator(ScriptedProvider::default());
        coordinator.set_file_to_play("a.mp3", false);
        let old = backend.item();
        coordinator.set_file_to_play("b.mp3", false);
        let rx = coordinator.subscribe();

        backend.events().reached_end(old);
        coordinator.dispatch_pending();

        assert!(drain(&rx).is_empty());
        assert_eq!(coordinator.state(), TransportState::Playing);
    }

    #[test]
    fn next_and_prev_without_provider_item_are_no_ops() {
        let (mut coordinator, backend) = coordinator(ScriptedProvider::default());
        coordinator.set_file_to_play("a.mp3", false);
        let rx = coordinator.subscribe();
        backend.clear_calls();

        assert!(!coordinator.play_next());
        assert!(!coordinator.play_prev());

        assert!(drain(&rx).is_empty());
        assert!(backend.calls().is_empty());
        assert_eq!(coordinator.state(), TransportState::Playing);
        assert_eq!(coordinator.file_to_play(), Some(&MediaLocator::from("a.mp3")));
    }

    #[test]
    fn prev_keeps_paused_state() {
        let provider = ScriptedProvider {
            prev: VecDeque::from(["z.mp3"]),
            ..Default::default()
        };
        let (mut coordinator, _backend) = coordinator(provider);
        coordinator.set_file_to_play("a.mp3", true);
        let rx = coordinator.subscribe();

        assert!(coordinator.play_prev());

        let events = drain(&rx);
        assert_eq!(stops(&events), vec![StopReason::MixChanging]);
        assert!(!events
            .iter()
            .any(|event| matches!(event, PlayerEvent::DidStartPlay { .. })));
        assert_eq!(coordinator.state(), TransportState::Paused);
        assert_eq!(coordinator.file_to_play(), Some(&MediaLocator::from("z.mp3")));
    }

    #[test]
    fn load_failure_skips_to_next_item() {
        let provider = ScriptedProvider {
            next: VecDeque::from(["good.mp3"]),
            ..Default::default()
        };
        let (mut coordinator, backend) = coordinator(provider);
        backend.break_locator("broken.mp3");
        let rx = coordinator.subscribe();

        coordinator.set_file_to_play("broken.mp3", false);

        let events = drain(&rx);
        assert_eq!(stops(&events), vec![StopReason::Failed]);
        assert_eq!(coordinator.state(), TransportState::Playing);
        assert_eq!(
            coordinator.file_to_play(),
            Some(&MediaLocator::from("good.mp3"))
        );
    }

    #[test]
    fn repeated_load_failures_give_up() {
        let provider = ScriptedProvider {
            always_next: Some("broken.mp3"),
            ..Default::default()
        };
        let (mut coordinator, backend) = coordinator(provider);
        backend.break_locator("broken.mp3");
        let rx = coordinator.subscribe();

        coordinator.set_file_to_play("broken.mp3", false);

        assert_eq!(stops(&drain(&rx)).len(), 3);
        assert_eq!(coordinator.state(), TransportState::Idle);
        assert!(coordinator.current_item().is_none());
    }

    #[test]
    fn progress_is_published_only_while_playing_with_known_duration() {
        let (mut coordinator, backend) = coordinator(ScriptedProvider::default());
        coordinator.set_file_to_play("a.mp3", false);
        let rx = coordinator.subscribe();

        backend.set_clock(Some(Duration::from_secs(30)), None);
        coordinator.publish_progress();
        assert!(drain(&rx).is_empty());

        backend.set_clock(Some(Duration::from_secs(30)), Some(Duration::from_secs(120)));
        coordinator.publish_progress();
        assert_eq!(drain(&rx), vec![PlayerEvent::DidChangeProgress(0.25)]);
        assert_eq!(coordinator.progress(), Some(0.25));
        assert_eq!(coordinator.current_time_left(), Some(Duration::from_secs(90)));

        coordinator.toggle_play_pause();
        drain(&rx);
        coordinator.publish_progress();
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn ticks_drive_progress() {
        let mut config = quiet_config();
        config.playback.progress_interval_ms = 10;
        let backend = MockBackend::default();
        let mut coordinator =
            PlaybackCoordinator::new(&config, backend.clone(), ScriptedProvider::default())
                .unwrap();
        coordinator.set_file_to_play("a.mp3", false);
        backend.set_clock(Some(Duration::from_secs(5)), Some(Duration::from_secs(10)));
        let rx = coordinator.subscribe();

        assert!(coordinator.run_once(TIMEOUT));
        assert_eq!(drain(&rx), vec![PlayerEvent::DidChangeProgress(0.5)]);
    }

    #[test]
    fn seek_delegates_converted_time() {
        let (mut coordinator, backend) = coordinator(ScriptedProvider::default());
        coordinator.set_file_to_play("a.mp3", true);
        backend.set_clock(Some(Duration::ZERO), Some(Duration::from_secs(200)));
        let rx = coordinator.subscribe();

        assert_eq!(coordinator.time_for_progress(0.0), Duration::ZERO);
        assert_eq!(coordinator.time_for_progress(1.0), Duration::from_secs(200));

        coordinator.seek_to_progress(0.25);

        assert!(backend.calls().contains(&Call::Seek(Duration::from_secs(50))));
        assert_eq!(drain(&rx), vec![PlayerEvent::DidChangeProgress(0.25)]);
        assert_eq!(coordinator.current_time(), Duration::from_secs(50));
    }
}
