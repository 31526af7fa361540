//! Video display surface with its own repaint cycle.

use crate::surface::{Drawable, RenderError, Surface, SurfaceFactory, SurfaceOptions, SurfaceTarget};
use facescope_core::Geometry;
use facescope_media::FrameTap;
use image::Rgba;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DISPLAY_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Default repaint period (60 Hz).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_nanos(1_000_000_000 / 60);

/// Display surface showing the live video, repainted on a fixed cadence
/// independent of detection.
///
/// Must be created inside a tokio runtime. Dropping it stops the repaint
/// task and disposes the surface.
pub struct DisplaySurface<S: Surface> {
    surface: Arc<Mutex<S>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<S: Surface> DisplaySurface<S> {
    pub fn create<F>(
        factory: &F,
        geometry: Geometry,
        frames: FrameTap,
        refresh_interval: Duration,
    ) -> Result<Self, RenderError>
    where
        F: SurfaceFactory<Surface = S>,
    {
        let mut surface = factory.create_surface(
            SurfaceTarget::Display,
            SurfaceOptions {
                width: geometry.display_width,
                height: geometry.display_height,
                background: Some(DISPLAY_BACKGROUND),
            },
        )?;
        surface.add_drawable(Drawable::Video(frames));

        let surface = Arc::new(Mutex::new(surface));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(repaint_loop(surface.clone(), cancel.clone(), refresh_interval));

        tracing::debug!(
            width = geometry.display_width,
            height = geometry.display_height,
            refresh_ms = refresh_interval.as_millis() as u64,
            "display surface created"
        );

        Ok(Self {
            surface,
            cancel,
            task: Some(task),
        })
    }

    /// Stop repainting and release the surface. Idempotent.
    pub fn dispose(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let mut surface = self.surface.lock().unwrap_or_else(PoisonError::into_inner);
        if !surface.is_disposed() {
            surface.dispose();
            tracing::debug!("display surface disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.surface.lock().unwrap_or_else(PoisonError::into_inner).is_disposed()
    }
}

impl<S: Surface> Drop for DisplaySurface<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn repaint_loop<S: Surface>(surface: Arc<Mutex<S>>, cancel: CancellationToken, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let mut surface = surface.lock().unwrap_or_else(PoisonError::into_inner);
                match surface.repaint() {
                    Ok(()) => {}
                    Err(RenderError::Disposed) => break,
                    Err(e) => tracing::warn!(error = %e, "display repaint failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::RasterFactory;
    use facescope_core::Frame;

    fn geometry() -> Geometry {
        Geometry::for_viewport(160, 1500)
    }

    #[tokio::test(start_paused = true)]
    async fn test_repaints_on_cadence() {
        let factory = RasterFactory::new();
        let mut rx = factory.subscribe(SurfaceTarget::Display);
        let (_tx, frames) = FrameTap::channel();

        let display = DisplaySurface::create(&factory, geometry(), frames, Duration::from_millis(16)).unwrap();
        rx.changed().await.unwrap();
        let image = rx.borrow_and_update().clone().expect("display painted");
        assert_eq!(image.dimensions(), (160, 90));
        assert_eq!(*image.get_pixel(0, 0), DISPLAY_BACKGROUND);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.has_changed().unwrap());
        drop(display);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shows_latest_frame() {
        let factory = RasterFactory::new();
        let mut rx = factory.subscribe(SurfaceTarget::Display);
        let (tx, frames) = FrameTap::channel();
        let _display = DisplaySurface::create(&factory, geometry(), frames, Duration::from_millis(16)).unwrap();

        let frame = Frame::from_rgb(vec![200; 16 * 9 * 3], 16, 9, 0, Duration::ZERO).unwrap();
        tx.send_replace(Some(Arc::new(frame)));
        tokio::time::sleep(Duration::from_millis(20)).await;

        rx.changed().await.unwrap();
        let image = rx.borrow_and_update().clone().unwrap();
        assert_eq!(*image.get_pixel(80, 45), Rgba([200, 200, 200, 255]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_stops_repaint() {
        let factory = RasterFactory::new();
        let rx = factory.subscribe(SurfaceTarget::Display);
        let (_tx, frames) = FrameTap::channel();
        let mut display = DisplaySurface::create(&factory, geometry(), frames, Duration::from_millis(16)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        display.dispose();
        assert!(display.is_disposed());
        assert!(rx.borrow().is_none());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.borrow().is_none(), "no repaint after dispose");
        display.dispose();
    }
}
