use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, in the coordinate space of the frame it
/// was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    /// Scale every coordinate independently along each axis.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
            confidence: self.confidence,
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
pub type Landmarks = [(f32, f32); 5];

/// Facial expressions scored by the expression classifier, in FER+ output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Neutral,
    Happy,
    Surprised,
    Sad,
    Angry,
    Disgusted,
    Fearful,
    Contempt,
}

pub const EXPRESSION_COUNT: usize = 8;

impl Expression {
    pub const ALL: [Expression; EXPRESSION_COUNT] = [
        Expression::Neutral,
        Expression::Happy,
        Expression::Surprised,
        Expression::Sad,
        Expression::Angry,
        Expression::Disgusted,
        Expression::Fearful,
        Expression::Contempt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Happy => "happy",
            Expression::Surprised => "surprised",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Disgusted => "disgusted",
            Expression::Fearful => "fearful",
            Expression::Contempt => "contempt",
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probability per [`Expression`], indexed in [`Expression::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Expressions {
    scores: [f32; EXPRESSION_COUNT],
}

impl Expressions {
    /// Build from raw classifier logits by applying a numerically stable softmax.
    pub fn from_logits(logits: &[f32; EXPRESSION_COUNT]) -> Self {
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut scores = [0.0f32; EXPRESSION_COUNT];
        let mut sum = 0.0f32;
        for (score, &logit) in scores.iter_mut().zip(logits.iter()) {
            *score = (logit - max).exp();
            sum += *score;
        }
        if sum > 0.0 {
            for score in scores.iter_mut() {
                *score /= sum;
            }
        }
        Self { scores }
    }

    pub fn from_probabilities(scores: [f32; EXPRESSION_COUNT]) -> Self {
        Self { scores }
    }

    pub fn get(&self, expression: Expression) -> f32 {
        self.scores[expression as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Expression, f32)> + '_ {
        Expression::ALL.iter().copied().zip(self.scores.iter().copied())
    }

    /// The most probable expression. Ties resolve to the earliest in FER+ order.
    pub fn dominant(&self) -> (Expression, f32) {
        let mut best = (Expression::Neutral, f32::NEG_INFINITY);
        for (expression, score) in self.iter() {
            if score > best.1 {
                best = (expression, score);
            }
        }
        best
    }
}

/// One face found in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub landmarks: Option<Landmarks>,
    pub expressions: Option<Expressions>,
}

impl Detection {
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            bounding_box: self.bounding_box.scaled(sx, sy),
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(x, y)| (x * sx, y * sy))),
            expressions: self.expressions,
        }
    }
}

/// Output of one inference call: the faces found, in the coordinate space of
/// a `frame_width` × `frame_height` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBatch {
    pub frame_width: u32,
    pub frame_height: u32,
    pub faces: Vec<Detection>,
}

impl DetectionBatch {
    pub fn empty(frame_width: u32, frame_height: u32) -> Self {
        Self {
            frame_width,
            frame_height,
            faces: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let logits = [1.0, 2.0, 0.5, -1.0, 0.0, 3.0, -2.0, 0.25];
        let e = Expressions::from_logits(&logits);
        let sum: f32 = e.iter().map(|(_, s)| s).sum();
        assert!((sum - 1.0).abs() < 1e-5, "sum = {sum}");
    }

    #[test]
    fn test_softmax_large_logits_stable() {
        let logits = [1000.0, 999.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let e = Expressions::from_logits(&logits);
        assert!(e.get(Expression::Neutral).is_finite());
        assert!(e.get(Expression::Neutral) > e.get(Expression::Happy));
    }

    #[test]
    fn test_dominant_expression() {
        let e = Expressions::from_probabilities([0.1, 0.05, 0.6, 0.05, 0.05, 0.05, 0.05, 0.05]);
        let (expr, score) = e.dominant();
        assert_eq!(expr, Expression::Surprised);
        assert!((score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_dominant_tie_prefers_first() {
        let e = Expressions::from_probabilities([0.125; EXPRESSION_COUNT]);
        assert_eq!(e.dominant().0, Expression::Neutral);
    }

    #[test]
    fn test_detection_scaled_includes_landmarks() {
        let d = Detection {
            bounding_box: BoundingBox { x: 10.0, y: 20.0, width: 30.0, height: 40.0, confidence: 0.9 },
            landmarks: Some([(10.0, 20.0); 5]),
            expressions: None,
        };
        let s = d.scaled(2.0, 0.5);
        assert_eq!(s.bounding_box.x, 20.0);
        assert_eq!(s.bounding_box.y, 10.0);
        assert_eq!(s.bounding_box.width, 60.0);
        assert_eq!(s.bounding_box.height, 20.0);
        assert_eq!(s.bounding_box.confidence, 0.9);
        assert_eq!(s.landmarks.unwrap()[0], (20.0, 10.0));
    }

    #[test]
    fn test_expression_serializes_lowercase() {
        let json = serde_json::to_string(&Expression::Disgusted).unwrap();
        assert_eq!(json, "\"disgusted\"");
    }
}
