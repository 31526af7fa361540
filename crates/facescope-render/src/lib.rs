//! facescope-render: drawing surfaces for the video display and the
//! detection overlay.

pub mod display;
pub mod overlay;
pub mod raster;
pub mod surface;

pub use display::{DisplaySurface, DEFAULT_REFRESH_INTERVAL};
pub use overlay::{expression_color, OverlayRenderer};
pub use raster::{composite, save_snapshot, RasterFactory, RasterSurface};
pub use surface::{Drawable, RenderError, Shape, Surface, SurfaceFactory, SurfaceOptions, SurfaceTarget};
