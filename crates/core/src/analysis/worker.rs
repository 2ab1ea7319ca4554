//! Dedicated spectrum thread.
//!
//! The render path hands buffers over with [`WorkerHandle::submit`], which
//! copies the samples and returns without waiting. Finished frames go to the
//! completion given to [`SpectrumWorker::spawn`], called once per analysed
//! job on the worker thread. At most one job is kept pending: a newer
//! submission replaces an older one that the thread has not picked up yet,
//! so latency stays bounded when analysis falls behind.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};

use super::{SpectrumEngine, SpectrumFrame};
use crate::{ItemId, PcmBuffer, Result};

/// Sample vectors kept around for reuse by the render path.
const RECYCLED_BUFFERS: usize = 4;

struct Job {
    item: ItemId,
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

/// Lock-free counters shared between the render path and the worker thread.
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    superseded: AtomicU64,
}

impl WorkerStats {
    fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_superseded(&self) {
        self.superseded.fetch_add(1, Ordering::Relaxed);
    }

    /// `(processed, superseded)` job counts.
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.processed.load(Ordering::Relaxed),
            self.superseded.load(Ordering::Relaxed),
        )
    }
}

/// Cloneable submission side of a [`SpectrumWorker`].
#[derive(Clone)]
pub struct WorkerHandle {
    job_tx: Sender<Job>,
    // Held so a full slot can be emptied from the submitting side.
    job_rx: Receiver<Job>,
    recycle_tx: Sender<Vec<f32>>,
    recycle_rx: Receiver<Vec<f32>>,
    running: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
}

impl WorkerHandle {
    /// Copies `buffer` into a recycled vector and queues it for analysis.
    /// Nothing is delivered for a job that a newer submission replaces before
    /// the thread picks it up.
    pub fn submit(&self, item: ItemId, buffer: &PcmBuffer<'_>) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }

        let mut samples = self.recycle_rx.try_recv().unwrap_or_default();
        samples.clear();
        samples.extend_from_slice(buffer.samples());

        let mut job = Job {
            item,
            samples,
            channels: buffer.channels(),
            sample_rate: buffer.sample_rate(),
        };

        loop {
            match self.job_tx.try_send(job) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(stale) = self.job_rx.try_recv() {
                        tracing::trace!(item = %stale.item, "superseding pending spectrum job");
                        self.stats.record_superseded();
                        let _ = self.recycle_tx.try_send(stale.samples);
                    }
                    job = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("stats", &self.stats)
            .finish()
    }
}

/// Owns the analysis thread. Dropping it stops and joins the thread.
pub struct SpectrumWorker {
    handle: WorkerHandle,
    shutdown_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SpectrumWorker {
    /// Starts the thread. `completion` receives every analysed frame, tagged
    /// with the item it was submitted for.
    pub fn spawn<F>(engine: SpectrumEngine, completion: F) -> Result<Self>
    where
        F: FnMut(SpectrumFrame) + Send + 'static,
    {
        let (job_tx, job_rx) = bounded::<Job>(1);
        let (recycle_tx, recycle_rx) = bounded::<Vec<f32>>(RECYCLED_BUFFERS);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(WorkerStats::default());

        let handle = WorkerHandle {
            job_tx,
            job_rx: job_rx.clone(),
            recycle_tx: recycle_tx.clone(),
            recycle_rx,
            running,
            stats: stats.clone(),
        };

        let thread = thread::Builder::new()
            .name("spectrum-worker".to_string())
            .spawn(move || run(engine, completion, job_rx, shutdown_rx, recycle_tx, stats))?;

        Ok(Self {
            handle,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    pub fn submit(&self, item: ItemId, buffer: &PcmBuffer<'_>) {
        self.handle.submit(item, buffer);
    }

    pub fn stats(&self) -> &WorkerStats {
        self.handle.stats()
    }
}

impl Drop for SpectrumWorker {
    fn drop(&mut self) {
        self.handle.running.store(false, Ordering::Release);
        self.shutdown_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("spectrum worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for SpectrumWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumWorker")
            .field("handle", &self.handle)
            .finish()
    }
}

fn run(
    mut engine: SpectrumEngine,
    mut completion: impl FnMut(SpectrumFrame),
    job_rx: Receiver<Job>,
    shutdown_rx: Receiver<()>,
    recycle_tx: Sender<Vec<f32>>,
    stats: Arc<WorkerStats>,
) {
    tracing::debug!(window = ?engine.window(), "spectrum worker started");
    loop {
        select! {
            recv(job_rx) -> job => match job {
                Ok(job) => {
                    let Job { item, samples, channels, sample_rate } = job;
                    let spectrum =
                        engine.compute_spectrum(&PcmBuffer::new(&samples, channels, sample_rate));
                    stats.record_processed();
                    completion(SpectrumFrame { item, spectrum });
                    let _ = recycle_tx.try_send(samples);
                }
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => break,
        }
    }
    tracing::debug!("spectrum worker stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam_channel::unbounded;

    use super::*;
    use crate::MagnitudeScale;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn engine(sample_count: usize) -> SpectrumEngine {
        SpectrumEngine::with_sample_count(sample_count, MagnitudeScale::Linear).unwrap()
    }

    #[test]
    fn completion_runs_off_the_submitting_thread() {
        let (tx, rx) = unbounded();
        let worker = SpectrumWorker::spawn(engine(256), move |frame| {
            let _ = tx.send((frame, thread::current().name().map(str::to_string)));
        })
        .unwrap();
        let samples = vec![0.25_f32; 256];
        let item = ItemId::next();

        worker.submit(item, &PcmBuffer::mono(&samples, 48_000));

        let (frame, thread_name) = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(frame.item, item);
        assert_eq!(frame.spectrum.len(), 128);
        assert_eq!(thread_name.as_deref(), Some("spectrum-worker"));
        assert_eq!(worker.stats().snapshot(), (1, 0));
    }

    #[test]
    fn newer_submissions_replace_pending_ones() {
        let (started_tx, started_rx) = bounded::<()>(1);
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let (done_tx, done_rx) = unbounded::<ItemId>();
        let mut parked = false;
        let worker = SpectrumWorker::spawn(engine(64), move |frame| {
            if !parked {
                parked = true;
                let _ = started_tx.send(());
                let _ = gate_rx.recv();
            }
            let _ = done_tx.send(frame.item);
        })
        .unwrap();
        let samples = vec![0.0_f32; 64];
        let buffer = PcmBuffer::mono(&samples, 48_000);

        let first = ItemId::next();
        worker.submit(first, &buffer);
        started_rx.recv_timeout(TIMEOUT).unwrap();

        // The worker is parked inside the first completion; these pile up on
        // the single pending slot.
        let ids: Vec<ItemId> = (0..3).map(|_| ItemId::next()).collect();
        for id in &ids {
            worker.submit(*id, &buffer);
        }
        gate_tx.send(()).unwrap();

        assert_eq!(done_rx.recv_timeout(TIMEOUT).unwrap(), first);
        assert_eq!(done_rx.recv_timeout(TIMEOUT).unwrap(), ids[2]);
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

        let (_, superseded) = worker.stats().snapshot();
        assert_eq!(superseded, 2);
    }

    #[test]
    fn submissions_after_shutdown_are_ignored() {
        let (tx, rx) = unbounded::<SpectrumFrame>();
        let worker = SpectrumWorker::spawn(engine(64), move |frame| {
            let _ = tx.send(frame);
        })
        .unwrap();
        let handle = worker.handle();
        drop(worker);

        let samples = vec![0.0_f32; 64];
        handle.submit(ItemId::next(), &PcmBuffer::mono(&samples, 48_000));

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
