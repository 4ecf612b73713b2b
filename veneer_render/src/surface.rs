//! Collaborator traits for pixel output.
//!
//! The cache replays commands onto a [`Surface`] and never touches pixels
//! itself. A surface is a dumb target: it owns a pixel buffer and a texture
//! of equal size, draws primitives into the buffer under a clip, and copies
//! dirty sub-regions into the texture on request. Compositing the texture
//! onto a window is the host's business.

use crate::font::{FontGroup, FontLibrary};
use crate::geometry::{Color, Rect};

/// An offscreen drawing target with an attached texture.
pub trait Surface {
    /// Logical size in grid pixels. Backends working in drawable pixels
    /// divide by their scale factor.
    fn size(&self) -> (i32, i32);

    /// Constrain subsequent primitive operations to `rect`.
    fn set_clip_rect(&mut self, rect: Rect);

    /// Fill `rect` with `color`, writing into the pixel buffer only.
    fn draw_rect(&mut self, rect: Rect, color: Color);

    /// Draw a run of text at a fractional pen position.
    fn draw_text(
        &mut self,
        fonts: &dyn FontLibrary,
        group: &FontGroup,
        text: &str,
        x: f64,
        y: i32,
        color: Color,
    );

    /// Copy the given sub-regions of the pixel buffer into the texture.
    fn upload(&mut self, rects: &[Rect]);
}

/// A texture that can receive sub-region updates from a pixel buffer.
///
/// `pixels` is the full RGBA8 source buffer with rows of `stride` pixels;
/// `rect` addresses the sub-region to copy, in the texture's own (drawable)
/// coordinates.
pub trait Texture {
    fn upload(&mut self, rect: Rect, pixels: &[u8], stride: usize);
}
