//! Retained-mode render cache for software-rendered user interfaces.
//!
//! All drawing operations issued during a frame are stored as commands in a
//! packed command buffer. At the end of the frame the commands are written to
//! a grid of hash values, the cells that changed since the previous frame are
//! merged into dirty rectangles, and only those regions are redrawn onto the
//! target surface.
//!
//! The crate is windowing-system agnostic: pixel output goes through the
//! [`Surface`] trait and text metrics come from a host-owned [`FontLibrary`].
//!
//! [`Surface`]: crate::surface::Surface
//! [`FontLibrary`]: crate::font::FontLibrary

pub mod cache;
pub mod command;
pub mod font;
pub mod geometry;
pub mod grid;
pub mod surface;

pub use crate::cache::RenderCache;
pub use crate::command::{Command, CommandBuffer};
pub use crate::font::{FontGroup, FontId, FontLibrary, FONT_FALLBACK_MAX};
pub use crate::geometry::{Color, Rect};
pub use crate::surface::{Surface, Texture};
