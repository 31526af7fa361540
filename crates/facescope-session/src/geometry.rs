//! Viewport tracking and change notification for the display geometry.

use facescope_core::Geometry;
use tokio::sync::watch;

/// Holds the current [`Geometry`] and notifies subscribers when it changes.
pub struct GeometryManager {
    max_width: u32,
    tx: watch::Sender<Geometry>,
}

impl GeometryManager {
    pub fn new(viewport_width: u32, max_width: u32) -> Self {
        let (tx, _) = watch::channel(Geometry::for_viewport(viewport_width, max_width));
        Self { max_width, tx }
    }

    /// Apply a new viewport width. Returns the new geometry only when it
    /// differs from the current one; subscribers are notified only then.
    pub fn update(&self, viewport_width: u32) -> Option<Geometry> {
        let next = Geometry::for_viewport(viewport_width, self.max_width);
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            tracing::debug!(
                viewport_width,
                width = next.display_width,
                height = next.display_height,
                "display geometry changed"
            );
            Some(next)
        } else {
            None
        }
    }

    pub fn current(&self) -> Geometry {
        *self.tx.borrow()
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    pub fn subscribe(&self) -> watch::Receiver<Geometry> {
        self.tx.subscribe()
    }
}
