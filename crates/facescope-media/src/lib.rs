//! facescope-media: media selection and paced video playback.
//!
//! Video decoding uses ffmpeg and is only compiled with the `ffmpeg` feature;
//! without it [`open_player`] and [`probe`] report
//! [`MediaError::DecoderUnavailable`].

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod media;
pub mod player;
pub mod source;

pub use media::{MediaError, MediaHandle, MediaInfo, SUPPORTED_EXTENSION};
pub use player::{FrameDecoder, FrameTap, PacedPlayer, PlaybackEngine};
pub use source::{FrameSource, FrameSourceState};

/// Start a player backed by the system's ffmpeg libraries.
#[cfg(feature = "ffmpeg")]
pub fn open_player() -> Result<PacedPlayer, MediaError> {
    PacedPlayer::spawn(ffmpeg::FfmpegDecoder::new())
}

#[cfg(not(feature = "ffmpeg"))]
pub fn open_player() -> Result<PacedPlayer, MediaError> {
    Err(MediaError::DecoderUnavailable)
}

/// Validate `media` and read its stream properties.
pub fn probe(media: &MediaHandle) -> Result<MediaInfo, MediaError> {
    media.validate()?;
    #[cfg(feature = "ffmpeg")]
    {
        ffmpeg::probe(media)
    }
    #[cfg(not(feature = "ffmpeg"))]
    {
        Err(MediaError::DecoderUnavailable)
    }
}
