//! Detection sampler.
//!
//! On a fixed cadence the sampler takes the current frame, submits it for
//! inference, and draws the rescaled results on the overlay. At most one
//! inference is in flight per sampler; ticks that land while one is pending
//! are skipped, not queued.

use crate::generation::SessionToken;
use facescope_core::{DetectOptions, Geometry, InferenceEngine};
use facescope_media::FrameTap;
use facescope_render::{OverlayRenderer, Surface};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Overlay shared between the session and late inference completions.
pub type SharedOverlay<S> = Arc<Mutex<OverlayRenderer<S>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SamplerStats {
    pub ticks: u64,
    pub dispatched: u64,
    pub skipped_busy: u64,
    pub skipped_no_frame: u64,
    pub failures: u64,
    pub stale_dropped: u64,
    pub drawn: u64,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    dispatched: AtomicU64,
    skipped_busy: AtomicU64,
    skipped_no_frame: AtomicU64,
    failures: AtomicU64,
    stale_dropped: AtomicU64,
    drawn: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SamplerStats {
        SamplerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            skipped_busy: self.skipped_busy.load(Ordering::Relaxed),
            skipped_no_frame: self.skipped_no_frame.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            stale_dropped: self.stale_dropped.load(Ordering::Relaxed),
            drawn: self.drawn.load(Ordering::Relaxed),
        }
    }
}

/// Clears the busy flag when the in-flight inference finishes, however it ends.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct DetectionSampler {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl DetectionSampler {
    /// Start sampling. Must be called inside a tokio runtime.
    pub fn spawn<E, S>(
        engine: Arc<E>,
        frames: FrameTap,
        geometry: Geometry,
        overlay: SharedOverlay<S>,
        token: SessionToken,
        period: Duration,
        options: DetectOptions,
    ) -> Self
    where
        E: InferenceEngine,
        S: Surface,
    {
        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());
        let cycle = Cycle {
            engine,
            frames,
            geometry,
            overlay,
            token,
            options,
            busy: Arc::new(AtomicBool::new(false)),
            counters: counters.clone(),
        };
        let task = tokio::spawn(sample_loop(cycle, cancel.clone(), period));

        Self {
            cancel,
            task: Some(task),
            counters,
        }
    }

    /// Cancel the pending tick. An inference already in flight is left to
    /// finish; its result is dropped by the session token check.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn stats(&self) -> SamplerStats {
        self.counters.snapshot()
    }
}

impl Drop for DetectionSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything one sampling tick needs.
struct Cycle<E, S: Surface> {
    engine: Arc<E>,
    frames: FrameTap,
    geometry: Geometry,
    overlay: SharedOverlay<S>,
    token: SessionToken,
    options: DetectOptions,
    busy: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

async fn sample_loop<E, S>(cycle: Cycle<E, S>, cancel: CancellationToken, period: Duration)
where
    E: InferenceEngine,
    S: Surface,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => cycle.tick(),
        }
    }
}

impl<E: InferenceEngine, S: Surface> Cycle<E, S> {
    fn tick(&self) {
        Counters::bump(&self.counters.ticks);

        let Some(frame) = self.frames.current() else {
            Counters::bump(&self.counters.skipped_no_frame);
            return;
        };
        if self.busy.swap(true, Ordering::SeqCst) {
            Counters::bump(&self.counters.skipped_busy);
            return;
        }
        Counters::bump(&self.counters.dispatched);

        let guard = BusyGuard(self.busy.clone());
        let engine = self.engine.clone();
        let overlay = self.overlay.clone();
        let token = self.token.clone();
        let counters = self.counters.clone();
        let geometry = self.geometry;
        let options = self.options;
        let sequence = frame.sequence;

        tokio::spawn(async move {
            let _guard = guard;
            let batch = match engine.detect(frame, options).await {
                Ok(batch) => batch,
                Err(e) => {
                    Counters::bump(&counters.failures);
                    tracing::warn!(error = %e, sequence, "detection failed; skipping cycle");
                    return;
                }
            };

            let faces = geometry.rescale(&batch);
            let mut overlay = overlay.lock().unwrap_or_else(PoisonError::into_inner);
            if !token.is_live() {
                Counters::bump(&counters.stale_dropped);
                tracing::debug!(generation = token.generation(), sequence, "stale detection discarded");
                return;
            }
            overlay.draw(&faces, &geometry);
            Counters::bump(&counters.drawn);
            tracing::debug!(faces = faces.len(), sequence, "detections drawn");
        });
    }
}
