//! Veneer — a software-rendered UI toolkit.
//!
//! The toolkit records drawing calls into per-surface retained caches
//! (provided by `veneer_render`), redraws only the regions that changed
//! between frames, and composites the resulting textures onto a window
//! through a pluggable [`PixelBackend`].
//!
//! [`PixelBackend`]: crate::backend::PixelBackend

pub mod backend;
pub mod font;
pub mod renderer;
pub mod surface;

pub use veneer_render::{Color, FontGroup, FontId, Rect};

pub use crate::backend::{PixelBackend, SoftwareBackend};
pub use crate::font::{FontOptions, FontRegistry};
pub use crate::renderer::{Renderer, SurfaceId};
pub use crate::surface::Surface;
