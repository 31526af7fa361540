//! Display geometry: fixed 16:9 display size derived from the viewport width.

use crate::types::{Detection, DetectionBatch};
use serde::{Deserialize, Serialize};

pub const ASPECT_WIDTH: u32 = 16;
pub const ASPECT_HEIGHT: u32 = 9;

/// Widest display the layout will grow to, in pixels.
pub const DEFAULT_MAX_DISPLAY_WIDTH: u32 = 1500;

/// Size of the display and overlay surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub display_width: u32,
    pub display_height: u32,
}

impl Geometry {
    /// Derive the display size for a viewport.
    ///
    /// Width is the viewport width clamped to `max_width`; height keeps 16:9,
    /// rounded to the nearest pixel (1500 → 844).
    pub fn for_viewport(viewport_width: u32, max_width: u32) -> Self {
        let display_width = viewport_width.min(max_width);
        Self {
            display_width,
            display_height: height_for_width(display_width),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.display_width == 0 || self.display_height == 0
    }

    /// Rescale a batch from the frame space it was detected in to this geometry.
    ///
    /// Each axis is scaled independently, matching how the video proxy is
    /// stretched to fill the display. An empty source frame yields no faces.
    pub fn rescale(&self, batch: &DetectionBatch) -> Vec<Detection> {
        if batch.frame_width == 0 || batch.frame_height == 0 {
            return Vec::new();
        }
        let sx = self.display_width as f32 / batch.frame_width as f32;
        let sy = self.display_height as f32 / batch.frame_height as f32;
        batch.faces.iter().map(|face| face.scaled(sx, sy)).collect()
    }
}

fn height_for_width(width: u32) -> u32 {
    // Integer round-half-up of width * 9 / 16.
    ((width as u64 * ASPECT_HEIGHT as u64 * 2 + ASPECT_WIDTH as u64) / (ASPECT_WIDTH as u64 * 2))
        as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    #[test]
    fn test_wide_viewport_is_capped() {
        let g = Geometry::for_viewport(1600, DEFAULT_MAX_DISPLAY_WIDTH);
        assert_eq!(g.display_width, 1500);
        assert_eq!(g.display_height, 844);
    }

    #[test]
    fn test_narrow_viewport_passes_through() {
        let g = Geometry::for_viewport(800, DEFAULT_MAX_DISPLAY_WIDTH);
        assert_eq!(g.display_width, 800);
        assert_eq!(g.display_height, 450);
    }

    #[test]
    fn test_height_matches_rounded_aspect_for_all_widths() {
        for ww in 0..=2000u32 {
            let g = Geometry::for_viewport(ww, DEFAULT_MAX_DISPLAY_WIDTH);
            assert_eq!(g.display_width, ww.min(DEFAULT_MAX_DISPLAY_WIDTH));
            let expected = (g.display_width as f64 * 9.0 / 16.0).round() as u32;
            assert_eq!(g.display_height, expected, "width {}", g.display_width);
        }
    }

    #[test]
    fn test_zero_viewport_is_empty() {
        assert!(Geometry::for_viewport(0, DEFAULT_MAX_DISPLAY_WIDTH).is_empty());
    }

    #[test]
    fn test_rescale_to_display() {
        let batch = DetectionBatch {
            frame_width: 640,
            frame_height: 360,
            faces: vec![Detection {
                bounding_box: BoundingBox { x: 64.0, y: 36.0, width: 128.0, height: 72.0, confidence: 0.8 },
                landmarks: Some([(320.0, 180.0); 5]),
                expressions: None,
            }],
        };
        let g = Geometry { display_width: 1280, display_height: 720 };
        let faces = g.rescale(&batch);
        assert_eq!(faces.len(), 1);
        let b = faces[0].bounding_box;
        assert_eq!((b.x, b.y, b.width, b.height), (128.0, 72.0, 256.0, 144.0));
        assert_eq!(faces[0].landmarks.unwrap()[2], (640.0, 360.0));
    }

    #[test]
    fn test_rescale_non_matching_aspect_scales_per_axis() {
        let batch = DetectionBatch {
            frame_width: 100,
            frame_height: 100,
            faces: vec![Detection {
                bounding_box: BoundingBox { x: 50.0, y: 50.0, width: 10.0, height: 10.0, confidence: 1.0 },
                landmarks: None,
                expressions: None,
            }],
        };
        let g = Geometry { display_width: 800, display_height: 450 };
        let b = g.rescale(&batch)[0].bounding_box;
        assert_eq!((b.x, b.y), (400.0, 225.0));
        assert_eq!((b.width, b.height), (80.0, 45.0));
    }

    #[test]
    fn test_rescale_empty_frame_yields_nothing() {
        let mut batch = DetectionBatch::empty(0, 0);
        batch.faces.push(Detection {
            bounding_box: BoundingBox { x: 0.0, y: 0.0, width: 1.0, height: 1.0, confidence: 1.0 },
            landmarks: None,
            expressions: None,
        });
        let g = Geometry::for_viewport(800, DEFAULT_MAX_DISPLAY_WIDTH);
        assert!(g.rescale(&batch).is_empty());
    }
}
