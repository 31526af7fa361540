//! facescope-core: frames, display geometry, and face analysis.
//!
//! Uses SCRFD for face detection and landmarks and FER+ for expression
//! scoring, both running via ONNX Runtime on a dedicated engine thread.

pub mod alignment;
pub mod detector;
pub mod engine;
pub mod expression;
pub mod frame;
pub mod geometry;
pub mod inference;
pub mod types;

use std::path::PathBuf;

pub use engine::{load_models, EngineConfig, EngineError, EngineHandle};
pub use frame::Frame;
pub use geometry::{Geometry, DEFAULT_MAX_DISPLAY_WIDTH};
pub use inference::{DetectOptions, DetectorVariant, InferenceEngine};
pub use types::{BoundingBox, Detection, DetectionBatch, Expression, Expressions, Landmarks};

/// Default model directory: `$XDG_DATA_HOME/facescope/models`, falling back to
/// `~/.local/share/facescope/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facescope")
        .join("models")
}
