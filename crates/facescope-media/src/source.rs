//! Frame source: the user-selected media, its playback engine, and the
//! play/pause intent reconciled against what the engine is actually doing.

use crate::media::{MediaError, MediaHandle, MediaInfo};
use crate::player::{FrameTap, PlaybackEngine};
use facescope_core::Frame;
use std::sync::Arc;

/// Source selection and playback intent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSourceState {
    pub source: Option<MediaHandle>,
    pub is_playing: bool,
}

pub struct FrameSource<P> {
    player: P,
    state: FrameSourceState,
    info: Option<MediaInfo>,
}

impl<P: PlaybackEngine> FrameSource<P> {
    pub fn new(player: P) -> Self {
        Self {
            player,
            state: FrameSourceState::default(),
            info: None,
        }
    }

    pub fn state(&self) -> &FrameSourceState {
        &self.state
    }

    pub fn source(&self) -> Option<&MediaHandle> {
        self.state.source.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    /// Load `handle`, rewind it, and start playing.
    ///
    /// Unsupported media is rejected before anything changes. Any failure
    /// once the engine has been asked to load leaves no source selected.
    pub async fn set_source(&mut self, handle: MediaHandle) -> Result<&MediaInfo, MediaError> {
        handle.validate()?;

        let info = match self.start(&handle).await {
            Ok(info) => info,
            Err(e) => {
                self.state = FrameSourceState::default();
                self.info = None;
                return Err(e);
            }
        };

        tracing::info!(source = %handle, width = info.width, height = info.height, "source changed");
        self.state = FrameSourceState {
            source: Some(handle),
            is_playing: true,
        };
        Ok(self.info.insert(info))
    }

    /// Start playback. Returns `false` without commanding the engine when
    /// already playing.
    pub fn play(&mut self) -> Result<bool, MediaError> {
        self.require_source()?;
        self.sync_playback_state();
        if self.state.is_playing {
            return Ok(false);
        }
        self.player.play()?;
        self.state.is_playing = true;
        Ok(true)
    }

    /// Pause playback. Returns `false` without commanding the engine when
    /// already paused.
    pub fn pause(&mut self) -> Result<bool, MediaError> {
        self.require_source()?;
        self.sync_playback_state();
        if !self.state.is_playing {
            return Ok(false);
        }
        self.player.pause()?;
        self.state.is_playing = false;
        Ok(true)
    }

    /// Pull the engine's play state into `is_playing`; `true` if it changed.
    pub fn sync_playback_state(&mut self) -> bool {
        if self.state.source.is_none() {
            return false;
        }
        let engine_playing = !self.player.is_paused();
        if engine_playing == self.state.is_playing {
            return false;
        }
        tracing::debug!(playing = engine_playing, "playback state reconciled from engine");
        self.state.is_playing = engine_playing;
        true
    }

    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.player.frames().current()
    }

    pub fn frames(&self) -> FrameTap {
        self.player.frames()
    }

    pub fn media_info(&self) -> Option<&MediaInfo> {
        self.info.as_ref()
    }

    /// Native dimensions of the loaded media.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.info.as_ref().map(|info| (info.width, info.height))
    }

    async fn start(&mut self, handle: &MediaHandle) -> Result<MediaInfo, MediaError> {
        let info = self.player.load(handle).await?;
        self.player.seek_to_start()?;
        self.player.play()?;
        Ok(info)
    }

    fn require_source(&self) -> Result<(), MediaError> {
        match self.state.source {
            Some(_) => Ok(()),
            None => Err(MediaError::NoSource),
        }
    }
}
