//! Inference engine thread.
//!
//! ONNX sessions are synchronous and want exclusive access, so the detector
//! and the expression classifier live on one dedicated OS thread. Callers talk
//! to it through a cloneable [`EngineHandle`] that implements
//! [`InferenceEngine`]; each request carries a oneshot reply channel.

use crate::detector::{DetectorError, FaceDetector};
use crate::expression::{ExpressionClassifier, ExpressionError, FERPLUS_MODEL_FILE};
use crate::frame::Frame;
use crate::inference::{DetectOptions, DetectorVariant, InferenceEngine};
use crate::types::DetectionBatch;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const REQUEST_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("expression classifier error: {0}")]
    Expression(#[from] ExpressionError),
    #[error("detector variant {requested} not loaded (engine runs {loaded})")]
    VariantNotLoaded {
        requested: DetectorVariant,
        loaded: DetectorVariant,
    },
    #[error("failed to start engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Where to find the models and which detector to load.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model_dir: PathBuf,
    pub variant: DetectorVariant,
}

impl EngineConfig {
    pub fn detector_path(&self) -> String {
        self.model_dir
            .join(self.variant.model_file())
            .to_string_lossy()
            .into_owned()
    }

    pub fn expression_path(&self) -> String {
        self.model_dir
            .join(FERPLUS_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    Detect {
        frame: Arc<Frame>,
        options: DetectOptions,
        reply: oneshot::Sender<Result<DetectionBatch, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    variant: DetectorVariant,
}

impl EngineHandle {
    /// The detector variant the engine thread loaded.
    pub fn variant(&self) -> DetectorVariant {
        self.variant
    }
}

impl InferenceEngine for EngineHandle {
    fn detect(
        &self,
        frame: Arc<Frame>,
        options: DetectOptions,
    ) -> impl Future<Output = Result<DetectionBatch, EngineError>> + Send {
        let tx = self.tx.clone();
        async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            tx.send(EngineRequest::Detect {
                frame,
                options,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
            reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
        }
    }
}

/// Load the detector and expression models and start the engine thread.
///
/// Resolves once both models are loaded. Fails with the load error if either
/// model is missing or rejected by ONNX Runtime; nothing is left running then.
pub async fn load_models(config: &EngineConfig) -> Result<EngineHandle, EngineError> {
    let detector_path = config.detector_path();
    let expression_path = config.expression_path();
    let variant = config.variant;

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(REQUEST_QUEUE_DEPTH);
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(), EngineError>>();

    std::thread::Builder::new()
        .name("facescope-engine".into())
        .spawn(move || {
            let loaded = FaceDetector::load(&detector_path)
                .map_err(EngineError::from)
                .and_then(|detector| {
                    let classifier = ExpressionClassifier::load(&expression_path)?;
                    Ok((detector, classifier))
                });

            let (mut detector, mut classifier) = match loaded {
                Ok(models) => {
                    let _ = ready_tx.send(Ok(()));
                    models
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            tracing::info!(%variant, "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Detect {
                        frame,
                        options,
                        reply,
                    } => {
                        let result = if options.variant != variant {
                            Err(EngineError::VariantNotLoaded {
                                requested: options.variant,
                                loaded: variant,
                            })
                        } else {
                            run_detect(&mut detector, &mut classifier, &frame, &options)
                        };
                        // Receiver gone means the caller stopped waiting; nothing to do.
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    ready_rx.await.map_err(|_| EngineError::ChannelClosed)??;
    tracing::info!(%variant, model_dir = %config.model_dir.display(), "models loaded");

    Ok(EngineHandle { tx, variant })
}

/// Detect faces, then score expressions per face on the luma plane.
///
/// A face whose expression scoring fails keeps `expressions: None` rather than
/// failing the whole frame.
fn run_detect(
    detector: &mut FaceDetector,
    classifier: &mut ExpressionClassifier,
    frame: &Frame,
    options: &DetectOptions,
) -> Result<DetectionBatch, EngineError> {
    let mut faces = detector.detect(frame, options.min_confidence)?;

    if options.with_expressions && !faces.is_empty() {
        let gray = frame.to_grayscale();
        for face in faces.iter_mut() {
            match classifier.classify(&gray, frame.width(), frame.height(), face) {
                Ok(expressions) => face.expressions = Some(expressions),
                Err(e) => {
                    tracing::debug!(error = %e, sequence = frame.sequence, "expression scoring skipped");
                }
            }
        }
    }

    if !options.with_landmarks {
        for face in faces.iter_mut() {
            face.landmarks = None;
        }
    }

    tracing::debug!(
        faces = faces.len(),
        sequence = frame.sequence,
        "engine: frame analysed"
    );

    Ok(DetectionBatch {
        frame_width: frame.width(),
        frame_height: frame.height(),
        faces,
    })
}
