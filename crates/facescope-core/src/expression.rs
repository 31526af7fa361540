//! FER+ facial expression classifier via ONNX Runtime.
//!
//! Scores eight expressions from a 64×64 grayscale face crop aligned on the
//! detector's landmarks, using the ONNX model zoo `emotion-ferplus-8` model.

use crate::alignment;
use crate::types::{Detection, Expressions, EXPRESSION_COUNT};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// FER+ takes raw 0–255 intensities, single channel, no normalization.
const FERPLUS_INPUT_SIZE: usize = 64;
pub const FERPLUS_MODEL_FILE: &str = "emotion-ferplus-8.onnx";

#[derive(Error, Debug)]
pub enum ExpressionError {
    #[error("model file not found: {0}; download emotion-ferplus-8 from the ONNX model zoo")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks; detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// FER+-based expression classifier.
pub struct ExpressionClassifier {
    session: Session,
}

impl ExpressionClassifier {
    /// Load the FER+ ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ExpressionError> {
        if !Path::new(model_path).exists() {
            return Err(ExpressionError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FER+ model"
        );

        Ok(Self { session })
    }

    /// Score expressions for one detected face.
    ///
    /// `gray` is the frame's luma plane; the face is aligned to a canonical
    /// 64×64 crop before classification.
    pub fn classify(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
        face: &Detection,
    ) -> Result<Expressions, ExpressionError> {
        let landmarks = face.landmarks.as_ref().ok_or(ExpressionError::NoLandmarks)?;
        let aligned = alignment::align_face(gray, width, height, landmarks, FERPLUS_INPUT_SIZE);
        let input = Self::preprocess(&aligned);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExpressionError::InferenceFailed(format!("expression scores: {e}")))?;

        let logits: [f32; EXPRESSION_COUNT] = raw.try_into().map_err(|_| {
            ExpressionError::InferenceFailed(format!(
                "expected {EXPRESSION_COUNT} expression scores, got {}",
                raw.len()
            ))
        })?;

        Ok(Expressions::from_logits(&logits))
    }

    /// Pack a 64×64 grayscale crop into a 1×1×64×64 float tensor.
    fn preprocess(aligned_face: &[u8]) -> Array4<f32> {
        let size = FERPLUS_INPUT_SIZE;
        Array4::from_shape_fn((1, 1, size, size), |(_, _, y, x)| {
            aligned_face.get(y * size + x).copied().unwrap_or(0) as f32
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_output_shape() {
        let aligned = vec![128u8; FERPLUS_INPUT_SIZE * FERPLUS_INPUT_SIZE];
        let tensor = ExpressionClassifier::preprocess(&aligned);
        assert_eq!(tensor.shape(), &[1, 1, FERPLUS_INPUT_SIZE, FERPLUS_INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_keeps_raw_intensity() {
        let mut aligned = vec![0u8; FERPLUS_INPUT_SIZE * FERPLUS_INPUT_SIZE];
        aligned[FERPLUS_INPUT_SIZE + 2] = 200;
        let tensor = ExpressionClassifier::preprocess(&aligned);
        assert_eq!(tensor[[0, 0, 1, 2]], 200.0);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
    }

    #[test]
    fn test_preprocess_short_crop_pads_with_black() {
        let tensor = ExpressionClassifier::preprocess(&[255u8; 10]);
        assert_eq!(tensor[[0, 0, 0, 9]], 255.0);
        assert_eq!(tensor[[0, 0, 0, 10]], 0.0);
    }

    #[test]
    fn test_load_missing_model() {
        let result = ExpressionClassifier::load("/nonexistent/emotion-ferplus-8.onnx");
        assert!(matches!(result, Err(ExpressionError::ModelNotFound(_))));
    }
}
