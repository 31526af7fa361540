//! Drawing surface boundary.
//!
//! A surface holds an ordered list of drawables and renders them on
//! `repaint`. The display and the overlay are separate surfaces stacked on
//! top of each other by whatever presents them.

use facescope_media::FrameTap;
use image::Rgba;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("surface already disposed")]
    Disposed,
    #[error("surface size {width}x{height} is empty")]
    EmptySurface { width: u32, height: u32 },
    #[error("snapshot write failed: {0}")]
    Snapshot(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Which layer a surface is created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceTarget {
    Display,
    Overlay,
}

impl SurfaceTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            SurfaceTarget::Display => "display",
            SurfaceTarget::Overlay => "overlay",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceOptions {
    pub width: u32,
    pub height: u32,
    /// Fill colour; `None` leaves the surface transparent.
    pub background: Option<Rgba<u8>>,
}

/// Vector shapes in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// Stroked, unfilled rectangle.
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        stroke: u32,
        color: Rgba<u8>,
    },
    /// Filled dot centred on `(x, y)`.
    Point {
        x: f32,
        y: f32,
        radius: f32,
        color: Rgba<u8>,
    },
}

pub enum Drawable {
    /// The current video frame, scaled to fill the surface.
    Video(FrameTap),
    Shape(Shape),
}

impl std::fmt::Debug for Drawable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Drawable::Video(_) => f.write_str("Video"),
            Drawable::Shape(shape) => f.debug_tuple("Shape").field(shape).finish(),
        }
    }
}

pub trait Surface: Send + 'static {
    fn add_drawable(&mut self, drawable: Drawable);
    /// Remove every drawable. The rendered output is unchanged until the
    /// next `repaint`.
    fn clear(&mut self);
    fn repaint(&mut self) -> Result<(), RenderError>;
    /// Release the surface. Later calls are ignored; `repaint` fails with
    /// [`RenderError::Disposed`].
    fn dispose(&mut self);
    fn is_disposed(&self) -> bool;
    fn size(&self) -> (u32, u32);
}

pub trait SurfaceFactory: Send + Sync + 'static {
    type Surface: Surface;

    fn create_surface(
        &self,
        target: SurfaceTarget,
        options: SurfaceOptions,
    ) -> Result<Self::Surface, RenderError>;
}
