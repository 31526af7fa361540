//! facescope-session: ties playback, inference, and rendering together.
//!
//! The [`SessionController`] owns the frame source and at most one
//! [`RenderSession`]. Each session runs a display repaint cycle and a
//! [`DetectionSampler`] against one source and one display geometry; any
//! change to either replaces the whole session.

pub mod controller;
pub mod generation;
pub mod geometry;
pub mod sampler;
pub mod session;

#[cfg(test)]
mod testing;

pub use controller::{ControlState, ControllerError, ControllerState, SessionController};
pub use generation::{SessionGenerations, SessionToken};
pub use geometry::GeometryManager;
pub use sampler::{DetectionSampler, SamplerStats, SharedOverlay, DEFAULT_SAMPLE_INTERVAL};
pub use session::{RenderSession, SessionSettings};
