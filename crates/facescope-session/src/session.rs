//! Render session: display, overlay, and sampler bound to one source and
//! one geometry.

use crate::generation::SessionToken;
use crate::sampler::{DetectionSampler, SamplerStats, SharedOverlay, DEFAULT_SAMPLE_INTERVAL};
use facescope_core::{DetectOptions, Geometry, InferenceEngine};
use facescope_media::{FrameTap, MediaHandle};
use facescope_render::{DisplaySurface, OverlayRenderer, RenderError, Surface, SurfaceFactory, DEFAULT_REFRESH_INTERVAL};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Timing and detection settings applied to every session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub sample_interval: Duration,
    pub refresh_interval: Duration,
    pub detect: DetectOptions,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            detect: DetectOptions::default(),
        }
    }
}

pub struct RenderSession<S: Surface> {
    source: MediaHandle,
    geometry: Geometry,
    token: SessionToken,
    display: DisplaySurface<S>,
    overlay: SharedOverlay<S>,
    sampler: DetectionSampler,
    torn_down: bool,
}

impl<S: Surface> RenderSession<S> {
    /// Create the surfaces and start repainting and sampling.
    ///
    /// Must be called inside a tokio runtime.
    pub fn activate<E, F>(
        factory: &F,
        engine: Arc<E>,
        frames: FrameTap,
        source: MediaHandle,
        geometry: Geometry,
        token: SessionToken,
        settings: &SessionSettings,
    ) -> Result<Self, RenderError>
    where
        E: InferenceEngine,
        F: SurfaceFactory<Surface = S>,
    {
        let display = DisplaySurface::create(factory, geometry, frames.clone(), settings.refresh_interval)?;
        let overlay = Arc::new(Mutex::new(OverlayRenderer::create(factory, geometry)?));
        let sampler = DetectionSampler::spawn(
            engine,
            frames,
            geometry,
            overlay.clone(),
            token.clone(),
            settings.sample_interval,
            settings.detect,
        );

        tracing::info!(
            generation = token.generation(),
            source = %source,
            width = geometry.display_width,
            height = geometry.display_height,
            "render session activated"
        );

        Ok(Self {
            source,
            geometry,
            token,
            display,
            overlay,
            sampler,
            torn_down: false,
        })
    }

    /// Stop sampling and release both surfaces. The generation must already
    /// have moved on so late results are rejected.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.sampler.stop();
        self.display.dispose();
        self.overlay.lock().unwrap_or_else(PoisonError::into_inner).dispose();

        let stats = self.sampler.stats();
        tracing::info!(
            generation = self.token.generation(),
            dispatched = stats.dispatched,
            drawn = stats.drawn,
            failures = stats.failures,
            "render session torn down"
        );
    }

    pub fn source(&self) -> &MediaHandle {
        &self.source
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn generation(&self) -> u64 {
        self.token.generation()
    }

    pub fn is_live(&self) -> bool {
        !self.torn_down && self.token.is_live()
    }

    pub fn stats(&self) -> SamplerStats {
        self.sampler.stats()
    }

    pub fn overlay(&self) -> SharedOverlay<S> {
        self.overlay.clone()
    }
}

impl<S: Surface> Drop for RenderSession<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
