//! Asynchronous face-analysis boundary.
//!
//! The detection sampler only sees this trait. [`crate::engine::EngineHandle`]
//! is the ONNX Runtime implementation; tests substitute scripted engines.

use crate::engine::EngineError;
use crate::frame::Frame;
use crate::types::DetectionBatch;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

/// SCRFD model size. Larger models are more accurate and slower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DetectorVariant {
    #[default]
    #[serde(rename = "10g")]
    Scrfd10g,
    #[serde(rename = "2.5g")]
    Scrfd2_5g,
    #[serde(rename = "500m")]
    Scrfd500m,
}

impl DetectorVariant {
    /// File name of the model inside the model directory.
    pub fn model_file(&self) -> &'static str {
        match self {
            DetectorVariant::Scrfd10g => "det_10g.onnx",
            DetectorVariant::Scrfd2_5g => "det_2.5g.onnx",
            DetectorVariant::Scrfd500m => "det_500m.onnx",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorVariant::Scrfd10g => "10g",
            DetectorVariant::Scrfd2_5g => "2.5g",
            DetectorVariant::Scrfd500m => "500m",
        }
    }
}

impl std::fmt::Display for DetectorVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "10g" | "det_10g" => Ok(DetectorVariant::Scrfd10g),
            "2.5g" | "det_2.5g" => Ok(DetectorVariant::Scrfd2_5g),
            "500m" | "det_500m" => Ok(DetectorVariant::Scrfd500m),
            other => Err(format!("unknown detector variant {other:?} (expected 10g, 2.5g, or 500m)")),
        }
    }
}

/// Per-request options for [`InferenceEngine::detect`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectOptions {
    pub variant: DetectorVariant,
    /// Faces scoring at or below this are dropped.
    pub min_confidence: f32,
    pub with_landmarks: bool,
    pub with_expressions: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            variant: DetectorVariant::default(),
            min_confidence: 0.5,
            with_landmarks: true,
            with_expressions: true,
        }
    }
}

/// Runs face detection, landmarks, and expression scoring on a frame.
///
/// Implementations must not block the caller: heavy work belongs on a
/// dedicated thread, with the returned future resolving on completion.
pub trait InferenceEngine: Send + Sync + 'static {
    fn detect(
        &self,
        frame: Arc<Frame>,
        options: DetectOptions,
    ) -> impl Future<Output = Result<DetectionBatch, EngineError>> + Send;
}
