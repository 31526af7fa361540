//! Detection overlay: boxes and landmark dots above the video.

use crate::surface::{Drawable, RenderError, Shape, Surface, SurfaceFactory, SurfaceOptions, SurfaceTarget};
use facescope_core::{Detection, Expression, Geometry};
use image::Rgba;

pub const BOX_STROKE: u32 = 2;
pub const LANDMARK_RADIUS: f32 = 2.0;
const LANDMARK_COLOR: Rgba<u8> = Rgba([0, 200, 255, 255]);
const UNSCORED_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Box colour for a face's dominant expression; white when unscored.
pub fn expression_color(expression: Option<Expression>) -> Rgba<u8> {
    match expression {
        None => UNSCORED_COLOR,
        Some(Expression::Neutral) => Rgba([160, 160, 160, 255]),
        Some(Expression::Happy) => Rgba([60, 220, 90, 255]),
        Some(Expression::Surprised) => Rgba([255, 210, 0, 255]),
        Some(Expression::Sad) => Rgba([70, 120, 255, 255]),
        Some(Expression::Angry) => Rgba([235, 40, 40, 255]),
        Some(Expression::Disgusted) => Rgba([140, 90, 30, 255]),
        Some(Expression::Fearful) => Rgba([170, 70, 220, 255]),
        Some(Expression::Contempt) => Rgba([255, 120, 180, 255]),
    }
}

/// Owns the overlay surface and redraws it from each detection batch.
pub struct OverlayRenderer<S: Surface> {
    surface: S,
    disposed: bool,
    draw_count: u64,
}

impl<S: Surface> OverlayRenderer<S> {
    /// Create a transparent overlay sized to `geometry`.
    pub fn create<F>(factory: &F, geometry: Geometry) -> Result<Self, RenderError>
    where
        F: SurfaceFactory<Surface = S>,
    {
        let surface = factory.create_surface(
            SurfaceTarget::Overlay,
            SurfaceOptions {
                width: geometry.display_width,
                height: geometry.display_height,
                background: None,
            },
        )?;
        Ok(Self {
            surface,
            disposed: false,
            draw_count: 0,
        })
    }

    /// Replace the overlay contents with `results`, already in display
    /// coordinates. An empty slice clears the overlay.
    pub fn draw(&mut self, results: &[Detection], geometry: &Geometry) {
        if self.disposed {
            tracing::debug!("overlay draw after dispose ignored");
            return;
        }

        self.surface.clear();
        let (w, h) = (geometry.display_width as f32, geometry.display_height as f32);

        for face in results {
            let bb = &face.bounding_box;
            let left = bb.x.max(0.0);
            let top = bb.y.max(0.0);
            let right = (bb.x + bb.width).min(w);
            let bottom = (bb.y + bb.height).min(h);
            if right <= left || bottom <= top {
                continue;
            }

            let dominant = face.expressions.as_ref().map(|e| e.dominant().0);
            self.surface.add_drawable(Drawable::Shape(Shape::Rect {
                x: left,
                y: top,
                width: right - left,
                height: bottom - top,
                stroke: BOX_STROKE,
                color: expression_color(dominant),
            }));

            for &(x, y) in face.landmarks.iter().flatten() {
                if (0.0..w).contains(&x) && (0.0..h).contains(&y) {
                    self.surface.add_drawable(Drawable::Shape(Shape::Point {
                        x,
                        y,
                        radius: LANDMARK_RADIUS,
                        color: LANDMARK_COLOR,
                    }));
                }
            }
        }

        match self.surface.repaint() {
            Ok(()) => self.draw_count += 1,
            Err(e) => tracing::warn!(error = %e, "overlay repaint failed"),
        }
    }

    /// Release the overlay surface. Idempotent.
    pub fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.surface.dispose();
            tracing::debug!(draws = self.draw_count, "overlay disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Number of completed draws.
    pub fn draw_count(&self) -> u64 {
        self.draw_count
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}
