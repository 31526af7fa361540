//! Software raster surfaces backed by `image` buffers.
//!
//! Each repaint renders the drawable list into an RGBA canvas and publishes
//! the result on a per-target watch channel, so a presenter (or the snapshot
//! writer) can pick up the latest display and overlay images.

use crate::surface::{Drawable, RenderError, Shape, Surface, SurfaceFactory, SurfaceOptions, SurfaceTarget};
use facescope_core::Frame;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbImage, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

pub type Published = Option<Arc<RgbaImage>>;

/// Creates [`RasterSurface`]s and exposes what they last rendered.
pub struct RasterFactory {
    display: Arc<watch::Sender<Published>>,
    overlay: Arc<watch::Sender<Published>>,
}

impl Default for RasterFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterFactory {
    pub fn new() -> Self {
        Self {
            display: Arc::new(watch::channel(None).0),
            overlay: Arc::new(watch::channel(None).0),
        }
    }

    /// Latest rendered image for `target`, updated on every repaint.
    pub fn subscribe(&self, target: SurfaceTarget) -> watch::Receiver<Published> {
        self.channel(target).subscribe()
    }

    fn channel(&self, target: SurfaceTarget) -> &Arc<watch::Sender<Published>> {
        match target {
            SurfaceTarget::Display => &self.display,
            SurfaceTarget::Overlay => &self.overlay,
        }
    }

    /// Display with the overlay composited on top, or `None` before the
    /// display has painted.
    pub fn composite(&self) -> Option<RgbaImage> {
        let display = self.display.borrow().clone()?;
        let overlay = self.overlay.borrow().clone();
        Some(composite(&display, overlay.as_deref()))
    }
}

impl SurfaceFactory for RasterFactory {
    type Surface = RasterSurface;

    fn create_surface(
        &self,
        target: SurfaceTarget,
        options: SurfaceOptions,
    ) -> Result<RasterSurface, RenderError> {
        if options.width == 0 || options.height == 0 {
            return Err(RenderError::EmptySurface {
                width: options.width,
                height: options.height,
            });
        }
        tracing::debug!(
            target = target.as_str(),
            width = options.width,
            height = options.height,
            "raster surface created"
        );
        Ok(RasterSurface {
            target,
            background: options.background.unwrap_or(TRANSPARENT),
            canvas: RgbaImage::new(options.width, options.height),
            drawables: Vec::new(),
            publish: self.channel(target).clone(),
            disposed: false,
        })
    }
}

pub struct RasterSurface {
    target: SurfaceTarget,
    background: Rgba<u8>,
    canvas: RgbaImage,
    drawables: Vec<Drawable>,
    publish: Arc<watch::Sender<Published>>,
    disposed: bool,
}

impl RasterSurface {
    /// The most recent rendered canvas.
    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn drawable_count(&self) -> usize {
        self.drawables.len()
    }

    fn render(&mut self) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = self.background;
        }
        for drawable in &self.drawables {
            match drawable {
                Drawable::Video(tap) => {
                    if let Some(frame) = tap.current() {
                        blit_frame(&mut self.canvas, &frame);
                    }
                }
                Drawable::Shape(Shape::Rect { x, y, width, height, stroke, color }) => {
                    let left = x.round() as i32;
                    let top = y.round() as i32;
                    let w = (x + width).round() as i32 - left;
                    let h = (y + height).round() as i32 - top;
                    for inset in 0..(*stroke).max(1) as i32 {
                        let (iw, ih) = (w - 2 * inset, h - 2 * inset);
                        if iw <= 0 || ih <= 0 {
                            break;
                        }
                        let rect = Rect::at(left + inset, top + inset).of_size(iw as u32, ih as u32);
                        draw_hollow_rect_mut(&mut self.canvas, rect, *color);
                    }
                }
                Drawable::Shape(Shape::Point { x, y, radius, color }) => {
                    let center = (x.floor() as i32, y.floor() as i32);
                    draw_filled_circle_mut(&mut self.canvas, center, radius.round().max(1.0) as i32, *color);
                }
            }
        }
    }
}

impl Surface for RasterSurface {
    fn add_drawable(&mut self, drawable: Drawable) {
        if !self.disposed {
            self.drawables.push(drawable);
        }
    }

    fn clear(&mut self) {
        self.drawables.clear();
    }

    fn repaint(&mut self) -> Result<(), RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        self.render();
        self.publish.send_replace(Some(Arc::new(self.canvas.clone())));
        Ok(())
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.drawables.clear();
        self.publish.send_replace(None);
        tracing::debug!(target = self.target.as_str(), "raster surface disposed");
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn size(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }
}

/// Nearest-neighbour scale of an RGB frame onto the whole canvas.
fn blit_frame(canvas: &mut RgbaImage, frame: &Frame) {
    let Some(rgb) = RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec()) else {
        return;
    };
    let (cw, ch) = canvas.dimensions();
    let rgba = DynamicImage::ImageRgb8(rgb).to_rgba8();
    let scaled = imageops::resize(&rgba, cw, ch, FilterType::Nearest);
    imageops::replace(canvas, &scaled, 0, 0);
}

/// Alpha-blend `overlay` onto a copy of `display`.
pub fn composite(display: &RgbaImage, overlay: Option<&RgbaImage>) -> RgbaImage {
    let mut out = display.clone();
    if let Some(overlay) = overlay {
        imageops::overlay(&mut out, overlay, 0, 0);
    }
    out
}

/// Write `image` as `frame-NNNNNN.png` under `dir`, creating `dir` if needed.
pub fn save_snapshot(image: &RgbaImage, dir: &Path, index: u64) -> Result<PathBuf, RenderError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("frame-{index:06}.png"));
    image.save(&path)?;
    Ok(path)
}
