//! Test doubles for the inference and playback boundaries.

use facescope_core::{BoundingBox, DetectOptions, Detection, DetectionBatch, EngineError, Frame, InferenceEngine};
use facescope_media::{FrameTap, MediaError, MediaHandle, MediaInfo, PlaybackEngine};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

pub fn face(x: f32, y: f32, width: f32, height: f32) -> Detection {
    Detection {
        bounding_box: BoundingBox { x, y, width, height, confidence: 0.9 },
        landmarks: None,
        expressions: None,
    }
}

pub fn frame(width: u32, height: u32, sequence: u64) -> Arc<Frame> {
    let data = vec![90; (width * height * 3) as usize];
    Arc::new(Frame::from_rgb(data, width, height, sequence, Duration::ZERO).unwrap())
}

/// Engine returning a fixed set of faces, optionally held behind a gate.
#[derive(Default)]
pub struct FakeEngine {
    pub faces: Vec<Detection>,
    pub fail: bool,
    pub calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl FakeEngine {
    pub fn returning(faces: Vec<Detection>) -> Self {
        Self { faces, ..Self::default() }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    /// Requests block until permits are added to the returned semaphore.
    pub fn gated(faces: Vec<Detection>) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let engine = Self {
            faces,
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (engine, gate)
    }
}

impl InferenceEngine for FakeEngine {
    fn detect(
        &self,
        frame: Arc<Frame>,
        _options: DetectOptions,
    ) -> impl Future<Output = Result<DetectionBatch, EngineError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.clone();
        let faces = self.faces.clone();
        let fail = self.fail;
        async move {
            if let Some(gate) = gate {
                let _permit = gate.acquire().await.map_err(|_| EngineError::ChannelClosed)?;
            }
            if fail {
                return Err(EngineError::ChannelClosed);
            }
            Ok(DetectionBatch {
                frame_width: frame.width(),
                frame_height: frame.height(),
                faces,
            })
        }
    }
}

#[derive(Default)]
pub struct PlayerCounters {
    pub loads: AtomicUsize,
    pub plays: AtomicUsize,
    pub pauses: AtomicUsize,
}

/// Player that records commands and publishes whatever the test sends.
pub struct FakePlayer {
    pub counters: Arc<PlayerCounters>,
    pub paused: Arc<AtomicBool>,
    pub frame_tx: Arc<watch::Sender<Option<Arc<Frame>>>>,
    frames: FrameTap,
}

impl FakePlayer {
    pub fn new() -> Self {
        let (frame_tx, frames) = FrameTap::channel();
        Self {
            counters: Arc::default(),
            paused: Arc::new(AtomicBool::new(true)),
            frame_tx: Arc::new(frame_tx),
            frames,
        }
    }
}

impl PlaybackEngine for FakePlayer {
    fn load(&mut self, _media: &MediaHandle) -> impl Future<Output = Result<MediaInfo, MediaError>> + Send {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        async move {
            Ok(MediaInfo {
                width: 640,
                height: 360,
                fps: 30.0,
                frame_count: None,
                codec: "h264".into(),
            })
        }
    }

    fn seek_to_start(&mut self) -> Result<(), MediaError> {
        Ok(())
    }

    fn play(&mut self) -> Result<(), MediaError> {
        self.counters.plays.fetch_add(1, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), MediaError> {
        self.counters.pauses.fetch_add(1, Ordering::SeqCst);
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn frames(&self) -> FrameTap {
        self.frames.clone()
    }
}
