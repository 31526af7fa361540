//! Media handles and the single supported container type.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// The only container accepted from the user.
pub const SUPPORTED_EXTENSION: &str = "mp4";

const FALLBACK_FPS: f64 = 30.0;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("unsupported media {handle}: only .mp4 files can be played")]
    UnsupportedMedia { handle: String },
    #[error("no media source loaded")]
    NoSource,
    #[error("failed to open {handle}: {reason}")]
    OpenFailed { handle: String, reason: String },
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    #[error("video decoding unavailable: this build has no decoder; rebuild with `cargo build --features ffmpeg` (needs the system ffmpeg libraries)")]
    DecoderUnavailable,
    #[error("failed to start player thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("player thread exited")]
    PlayerClosed,
}

/// Opaque handle to user-selected media: a local path or a remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaHandle(String);

impl MediaHandle {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` for `scheme://...` locations.
    pub fn is_remote(&self) -> bool {
        match self.0.split_once("://") {
            Some((scheme, _)) => {
                !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
            }
            None => false,
        }
    }

    /// Lowercased file extension of the last path segment.
    ///
    /// Query strings and fragments of remote locations are ignored.
    pub fn extension(&self) -> Option<String> {
        let location = if self.is_remote() {
            let end = self.0.find(|c: char| c == '?' || c == '#').unwrap_or(self.0.len());
            &self.0[..end]
        } else {
            self.0.as_str()
        };
        Path::new(location)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }

    /// Reject anything but the supported container.
    pub fn validate(&self) -> Result<(), MediaError> {
        match self.extension() {
            Some(ext) if ext == SUPPORTED_EXTENSION => Ok(()),
            _ => Err(MediaError::UnsupportedMedia {
                handle: self.0.clone(),
            }),
        }
    }
}

impl std::fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stream properties reported when media is opened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Container-reported frame count; `None` when unknown (e.g. live streams).
    pub frame_count: Option<u64>,
    pub codec: String,
}

impl MediaInfo {
    /// Time between frames at the native rate. Falls back to 30 fps when the
    /// container reports no usable rate.
    pub fn frame_interval(&self) -> Duration {
        let fps = if self.fps.is_finite() && self.fps >= 1.0 {
            self.fps.min(1000.0)
        } else {
            FALLBACK_FPS
        };
        Duration::from_secs_f64(1.0 / fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mp4_accepted() {
        assert!(MediaHandle::new("/videos/clip.mp4").validate().is_ok());
        assert!(MediaHandle::new("clip.MP4").validate().is_ok());
    }

    #[test]
    fn test_other_containers_rejected() {
        for name in ["clip.webm", "clip.mov", "clip.mkv", "clip", "mp4", "clip.mp4.txt"] {
            let err = MediaHandle::new(name).validate().unwrap_err();
            assert!(
                matches!(err, MediaError::UnsupportedMedia { ref handle } if handle == name),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_remote_url_ignores_query() {
        let h = MediaHandle::new("https://example.com/media/sample.mp4?token=abc#t=10");
        assert!(h.is_remote());
        assert_eq!(h.extension().as_deref(), Some("mp4"));
        assert!(h.validate().is_ok());
    }

    #[test]
    fn test_local_path_is_not_remote() {
        assert!(!MediaHandle::new("/tmp/a.mp4").is_remote());
        assert!(!MediaHandle::new("C:\\videos\\a.mp4").is_remote());
    }

    #[test]
    fn test_unsupported_message_names_extension() {
        let err = MediaHandle::new("a.avi").validate().unwrap_err();
        assert_eq!(err.to_string(), "unsupported media a.avi: only .mp4 files can be played");
    }

    #[test]
    fn test_frame_interval() {
        let mut info = MediaInfo { width: 640, height: 360, fps: 25.0, frame_count: None, codec: "h264".into() };
        assert_eq!(info.frame_interval(), Duration::from_millis(40));
        info.fps = 0.0;
        assert_eq!(info.frame_interval(), Duration::from_secs_f64(1.0 / 30.0));
        info.fps = f64::NAN;
        assert_eq!(info.frame_interval(), Duration::from_secs_f64(1.0 / 30.0));
    }
}
