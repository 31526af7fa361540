use facescope_core::{DetectOptions, DetectorVariant, EngineConfig, DEFAULT_MAX_DISPLAY_WIDTH};
use facescope_session::SessionSettings;
use std::path::PathBuf;
use std::time::Duration;

/// Demo configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// SCRFD variant to load (default: 10g).
    pub detector: DetectorVariant,
    /// Faces scoring at or below this are dropped.
    pub min_confidence: f32,
    /// Period of the detection sampler.
    pub sample_interval: Duration,
    /// Display repaint rate in Hz.
    pub refresh_hz: u32,
    /// Widest the display grows regardless of viewport.
    pub max_display_width: u32,
    /// Initial viewport width.
    pub viewport_width: u32,
    /// Where to write composited snapshots; disabled when unset.
    pub snapshot_dir: Option<PathBuf>,
    /// Media opened at start-up when no source is given on the command line.
    pub sample_source: Option<String>,
}

impl Config {
    /// Load configuration from `FACESCOPE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            model_dir: lookup("FACESCOPE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(facescope_core::default_model_dir),
            detector: parse_or(&lookup, "FACESCOPE_DETECTOR", DetectorVariant::default()),
            min_confidence: parse_or(&lookup, "FACESCOPE_MIN_CONFIDENCE", 0.5),
            sample_interval: Duration::from_millis(parse_or(&lookup, "FACESCOPE_SAMPLE_INTERVAL_MS", 100)),
            refresh_hz: parse_or(&lookup, "FACESCOPE_REFRESH_HZ", 60),
            max_display_width: parse_or(&lookup, "FACESCOPE_MAX_DISPLAY_WIDTH", DEFAULT_MAX_DISPLAY_WIDTH),
            viewport_width: parse_or(&lookup, "FACESCOPE_VIEWPORT_WIDTH", 1280),
            snapshot_dir: lookup("FACESCOPE_SNAPSHOT_DIR").map(PathBuf::from),
            sample_source: lookup("FACESCOPE_SAMPLE_SOURCE").filter(|s| !s.is_empty()),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            model_dir: self.model_dir.clone(),
            variant: self.detector,
        }
    }

    pub fn detect_options(&self) -> DetectOptions {
        DetectOptions {
            variant: self.detector,
            min_confidence: self.min_confidence,
            ..DetectOptions::default()
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            sample_interval: self.sample_interval.max(Duration::from_millis(1)),
            refresh_interval: Duration::from_secs(1) / self.refresh_hz.max(1),
            detect: self.detect_options(),
        }
    }
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
