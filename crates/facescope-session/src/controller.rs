//! Session controller: model loading, source and playback commands, and the
//! single live render session.

use crate::generation::SessionGenerations;
use crate::geometry::GeometryManager;
use crate::sampler::SamplerStats;
use crate::session::{RenderSession, SessionSettings};
use facescope_core::{EngineError, Geometry, InferenceEngine};
use facescope_media::{FrameSource, FrameSourceState, FrameTap, MediaError, MediaHandle, MediaInfo, PlaybackEngine};
use facescope_render::{RenderError, SurfaceFactory};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("models are not loaded yet")]
    NotReady,
    #[error("model load failed: {0}")]
    ModelLoad(#[source] EngineError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error("render session: {0}")]
    Render(#[from] RenderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Uninitialized,
    ModelsLoading,
    Ready,
    SessionActive,
}

impl ControllerState {
    pub fn as_str(self) -> &'static str {
        match self {
            ControllerState::Uninitialized => "uninitialized",
            ControllerState::ModelsLoading => "models_loading",
            ControllerState::Ready => "ready",
            ControllerState::SessionActive => "session_active",
        }
    }
}

/// Which user controls are currently actionable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlState {
    pub select_enabled: bool,
    pub play_enabled: bool,
    pub pause_enabled: bool,
}

pub struct SessionController<E, F, P>
where
    F: SurfaceFactory,
{
    state: ControllerState,
    engine: Option<Arc<E>>,
    factory: F,
    source: FrameSource<P>,
    geometry: GeometryManager,
    generations: SessionGenerations,
    settings: SessionSettings,
    session: Option<RenderSession<F::Surface>>,
}

impl<E, F, P> SessionController<E, F, P>
where
    E: InferenceEngine,
    F: SurfaceFactory,
    P: PlaybackEngine,
{
    pub fn new(factory: F, player: P, geometry: GeometryManager, settings: SessionSettings) -> Self {
        Self {
            state: ControllerState::Uninitialized,
            engine: None,
            factory,
            source: FrameSource::new(player),
            geometry,
            generations: SessionGenerations::new(),
            settings,
            session: None,
        }
    }

    /// Wait for the models to load. On success the controller becomes
    /// ready and starts a session if a source is already selected. On
    /// failure it stays in `ModelsLoading`; calling again retries.
    pub async fn load_models<L>(&mut self, loading: L) -> Result<(), ControllerError>
    where
        L: Future<Output = Result<E, EngineError>>,
    {
        if self.engine.is_some() {
            return Ok(());
        }
        self.state = ControllerState::ModelsLoading;

        match loading.await {
            Ok(engine) => {
                self.engine = Some(Arc::new(engine));
                self.state = ControllerState::Ready;
                tracing::info!("models ready");
                if self.source.source().is_some() {
                    self.rebuild()?;
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "model load failed");
                Err(ControllerError::ModelLoad(e))
            }
        }
    }

    /// Switch to new media and rebuild the session around it.
    ///
    /// Unsupported media is rejected with nothing changed.
    pub async fn select_source(&mut self, handle: MediaHandle) -> Result<MediaInfo, ControllerError> {
        self.require_ready()?;
        let result = self.source.set_source(handle).await.cloned();
        match result {
            Ok(info) => {
                self.rebuild()?;
                Ok(info)
            }
            Err(e @ MediaError::UnsupportedMedia { .. }) => Err(e.into()),
            Err(e) => {
                // The previous source was unloaded by the failed attempt.
                self.teardown_session();
                Err(e.into())
            }
        }
    }

    /// Returns whether a play command was sent.
    pub fn play(&mut self) -> Result<bool, ControllerError> {
        self.require_ready()?;
        Ok(self.source.play()?)
    }

    /// Returns whether a pause command was sent.
    pub fn pause(&mut self) -> Result<bool, ControllerError> {
        self.require_ready()?;
        Ok(self.source.pause()?)
    }

    /// Apply a new viewport width. Returns `true` when the session was
    /// rebuilt, which happens on any geometry change once models are loaded
    /// and a source is selected. An empty geometry leaves no session until
    /// the viewport grows again.
    pub fn resize(&mut self, viewport_width: u32) -> Result<bool, ControllerError> {
        if self.geometry.update(viewport_width).is_none() {
            return Ok(false);
        }
        if self.engine.is_none() || self.source.source().is_none() {
            return Ok(false);
        }
        self.rebuild()?;
        Ok(true)
    }

    /// Pull engine-initiated playback changes (end of stream) into the
    /// source state. Returns `true` if anything changed.
    pub fn reconcile(&mut self) -> bool {
        self.source.sync_playback_state()
    }

    pub fn controls(&self) -> ControlState {
        let ready = self.is_ready();
        let has_source = self.source.source().is_some();
        let playing = self.source.is_playing();
        ControlState {
            select_enabled: ready,
            play_enabled: ready && has_source && !playing,
            pause_enabled: ready && has_source && playing,
        }
    }

    /// Tear down the active session and pause playback.
    pub fn dispose(&mut self) {
        self.teardown_session();
        if self.source.source().is_some() {
            if let Err(e) = self.source.pause() {
                tracing::warn!(error = %e, "pause on dispose failed");
            }
        }
        tracing::info!(state = self.state.as_str(), "controller disposed");
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry.current()
    }

    pub fn source_state(&self) -> &FrameSourceState {
        self.source.state()
    }

    pub fn media_info(&self) -> Option<&MediaInfo> {
        self.source.media_info()
    }

    pub fn frames(&self) -> FrameTap {
        self.source.frames()
    }

    pub fn session(&self) -> Option<&RenderSession<F::Surface>> {
        self.session.as_ref()
    }

    pub fn session_stats(&self) -> Option<SamplerStats> {
        self.session.as_ref().map(RenderSession::stats)
    }

    pub fn generation(&self) -> u64 {
        self.generations.current()
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    fn is_ready(&self) -> bool {
        matches!(self.state, ControllerState::Ready | ControllerState::SessionActive)
    }

    fn require_ready(&self) -> Result<(), ControllerError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(ControllerError::NotReady)
        }
    }

    /// Invalidate the current generation, tear down the old session, then
    /// build a new one for the current source and geometry.
    fn rebuild(&mut self) -> Result<(), ControllerError> {
        let token = self.generations.advance();
        if let Some(mut old) = self.session.take() {
            old.teardown();
        }
        self.state = ControllerState::Ready;

        let (Some(engine), Some(source)) = (self.engine.clone(), self.source.source().cloned()) else {
            return Ok(());
        };
        let geometry = self.geometry.current();
        if geometry.is_empty() {
            tracing::debug!("viewport too small; no session");
            return Ok(());
        }

        let session = RenderSession::activate(
            &self.factory,
            engine,
            self.source.frames(),
            source,
            geometry,
            token,
            &self.settings,
        )?;
        self.session = Some(session);
        self.state = ControllerState::SessionActive;
        Ok(())
    }

    fn teardown_session(&mut self) {
        self.generations.advance();
        if let Some(mut session) = self.session.take() {
            session.teardown();
        }
        if self.state == ControllerState::SessionActive {
            self.state = ControllerState::Ready;
        }
    }
}

impl<E, F: SurfaceFactory, P> Drop for SessionController<E, F, P> {
    fn drop(&mut self) {
        // Sessions tear themselves down on drop; move the generation first so
        // nothing in flight can draw.
        self.generations.advance();
    }
}
