//! The renderer context: surfaces, fonts, and frame presentation.
//!
//! Hosts drive drawing through one [`Renderer`] value instead of process
//! globals. The "current surface" the drawing calls target is an owned
//! selector on the context; calls issued with no selection fail instead of
//! writing anywhere. Coordinates cross this boundary as floats and are
//! snapped to the pixel grid here, before recording.

use std::fmt::{self, Display, Formatter};
use std::path::Path;

use veneer_render::font::FontGroup;
use veneer_render::geometry::{Color, Rect};
use veneer_render::RenderCache;

use crate::backend::{self, PixelBackend};
use crate::font::{self, FontRegistry};
use crate::surface::Surface;

/// Renderer errors.
#[derive(Debug)]
pub enum Error {
    /// A drawing call was issued with no current surface selected.
    NoCurrentSurface,

    /// The surface handle does not refer to a live surface.
    InvalidSurface,

    /// A color sequence component was missing or out of place.
    InvalidColor { index: usize },

    /// Error in font configuration.
    Font(font::Error),

    /// Error from the pixel backend.
    Backend(backend::Error),

    /// Error writing a debug image.
    Png(png::EncodingError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Font(err) => Some(err),
            Error::Backend(err) => Some(err),
            Error::Png(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoCurrentSurface => {
                write!(f, "no current surface set; call set_current_surface first")
            },
            Error::InvalidSurface => write!(f, "surface handle is stale"),
            Error::InvalidColor { index } => {
                write!(f, "color component {index}: number expected")
            },
            Error::Font(err) => err.fmt(f),
            Error::Backend(err) => err.fmt(f),
            Error::Png(err) => err.fmt(f),
        }
    }
}

impl From<font::Error> for Error {
    fn from(val: font::Error) -> Self {
        Error::Font(val)
    }
}

impl From<backend::Error> for Error {
    fn from(val: backend::Error) -> Self {
        Error::Backend(val)
    }
}

impl From<png::EncodingError> for Error {
    fn from(val: png::EncodingError) -> Self {
        Error::Png(val)
    }
}

/// Handle to a surface owned by a [`Renderer`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SurfaceId(usize);

struct Entry<T> {
    surface: Surface<T>,
    cache: RenderCache,
}

/// Convert a 3-or-4 element color sequence into a [`Color`].
///
/// A missing sequence yields `(def, def, def, 255)`; a missing alpha
/// defaults to 255. Components are truncated to 8 bits.
pub fn color_from_seq(values: Option<&[i64]>, def: u8) -> Result<Color> {
    let values = match values {
        None => return Ok(Color::new(def, def, def, 255)),
        Some(values) => values,
    };
    if values.len() < 3 {
        return Err(Error::InvalidColor { index: values.len() + 1 });
    }
    let a = values.get(3).copied().unwrap_or(255);
    Ok(Color::new(values[0] as u8, values[1] as u8, values[2] as u8, a as u8))
}

/// Owner of every surface, cache, and font the host renders with.
pub struct Renderer<B: PixelBackend> {
    backend: B,
    fonts: FontRegistry,
    surfaces: Vec<Option<Entry<B::Texture>>>,
    current: Option<SurfaceId>,
}

impl<B: PixelBackend> Renderer<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, fonts: FontRegistry::new(), surfaces: Vec::new(), current: None }
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn fonts(&self) -> &FontRegistry {
        &self.fonts
    }

    #[inline]
    pub fn fonts_mut(&mut self) -> &mut FontRegistry {
        &mut self.fonts
    }

    /// Window size in logical points.
    pub fn get_size(&self) -> (i32, i32) {
        self.backend.window_size()
    }

    /// Create an offscreen surface at origin `(x, y)`.
    pub fn create_surface(&mut self, x: f64, y: f64, width: f64, height: f64) -> Result<SurfaceId> {
        let (width, height) = (width.round() as i32, height.round() as i32);
        let scale = self.backend.scale();
        let texture = self.backend.create_texture(width * scale, height * scale)?;
        let surface = Surface::new(texture, x as i32, y as i32, width, height, scale);

        let slot = self.surfaces.iter().position(Option::is_none).unwrap_or_else(|| {
            self.surfaces.push(None);
            self.surfaces.len() - 1
        });
        self.surfaces[slot] = Some(Entry { surface, cache: RenderCache::new() });
        Ok(SurfaceId(slot))
    }

    pub fn destroy_surface(&mut self, id: SurfaceId) -> Result<()> {
        self.entry_mut(id)?;
        self.surfaces[id.0] = None;
        if self.current == Some(id) {
            self.current = None;
        }
        Ok(())
    }

    /// Origin and logical size of a surface.
    pub fn surface_rect(&self, id: SurfaceId) -> Result<Rect> {
        Ok(self.entry(id)?.surface.rect())
    }

    pub fn set_surface_position(&mut self, id: SurfaceId, x: f64, y: f64) -> Result<()> {
        self.entry_mut(id)?.surface.set_position(x as i32, y as i32);
        Ok(())
    }

    /// Reallocate a surface's pixels and texture for a new size. The cache
    /// notices the change at the next `begin_frame` and repaints fully.
    pub fn resize_surface(&mut self, id: SurfaceId, width: f64, height: f64) -> Result<()> {
        let (width, height) = (width.round() as i32, height.round() as i32);
        let scale = self.backend.scale();
        let texture = self.backend.create_texture(width * scale, height * scale)?;
        self.entry_mut(id)?.surface.resize(texture, width, height);
        Ok(())
    }

    /// Dump a surface's pixel buffer as a PNG, for debugging.
    pub fn save_surface_png(&self, id: SurfaceId, path: &Path) -> Result<()> {
        self.entry(id)?.surface.save_png(path)?;
        Ok(())
    }

    /// Select the surface targeted by the stateful drawing calls.
    pub fn set_current_surface(&mut self, id: SurfaceId) -> Result<()> {
        self.entry(id)?;
        self.current = Some(id);
        Ok(())
    }

    /// Overlay the surface's dirty regions with translucent colors.
    pub fn show_debug(&mut self, id: SurfaceId, enabled: bool) -> Result<()> {
        self.entry_mut(id)?.cache.set_show_debug(enabled);
        Ok(())
    }

    /// Start recording a frame for the given surface.
    pub fn begin_frame(&mut self, id: SurfaceId) -> Result<()> {
        let Entry { surface, cache } = self.entry_mut(id)?;
        cache.begin_frame(surface);
        Ok(())
    }

    /// Record a clip for the current surface.
    pub fn set_clip_rect(&mut self, x: f64, y: f64, width: f64, height: f64) -> Result<()> {
        let rect = Rect::from_points(x, y, width, height);
        self.current_entry()?.cache.set_clip_rect(rect);
        Ok(())
    }

    /// Reset the current surface's clip to its full bounds.
    pub fn clear_clip_rect(&mut self) -> Result<()> {
        let entry = self.current_entry()?;
        let rect = entry.surface.rect();
        entry.cache.set_clip_rect(Rect::new(0, 0, rect.width, rect.height));
        Ok(())
    }

    /// Record a filled rectangle on the current surface.
    pub fn draw_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Color) -> Result<()> {
        let rect = Rect::from_points(x, y, width, height);
        self.current_entry()?.cache.draw_rect(rect, color);
        Ok(())
    }

    /// Record a text run on the current surface and return the advanced pen
    /// position. The fonts of `group` stay pinned until the host clears its
    /// font references.
    pub fn draw_text(
        &mut self,
        group: &FontGroup,
        text: &str,
        x: f64,
        y: i32,
        color: Color,
    ) -> Result<f64> {
        // Borrow the entry directly from the surface table so the font
        // registry stays available for pinning and measurement.
        let id = self.current.ok_or(Error::NoCurrentSurface)?;
        let entry = Self::entry_in(&mut self.surfaces, id)?;
        self.fonts.pin_group(group);
        Ok(entry.cache.draw_text(&self.fonts, group, text, x, y, color))
    }

    /// Diff the recorded frame, redraw and upload the changed regions, and
    /// composite the surface's texture onto the window.
    pub fn present_surface(&mut self, id: SurfaceId) -> Result<()> {
        let Entry { surface, cache } = Self::entry_in(&mut self.surfaces, id)?;

        cache.end_frame(surface, &mut self.fonts);
        cache.update_rects(surface);
        cache.swap_buffers();

        let (x, y) = surface.position();
        self.backend.render_texture(surface.texture(), x, y);
        Ok(())
    }

    /// Flip the window; it becomes visible on the first call.
    pub fn present_window(&mut self) {
        self.backend.present();
    }

    /// Clip the direct-to-window drawing path.
    pub fn set_render_clip_rect(&mut self, rect: Option<(f64, f64, f64, f64)>) {
        self.backend.set_clip_rect(rect.map(|(x, y, width, height)| {
            Rect::new(x as i32, y as i32, width as i32, height as i32)
        }));
    }

    /// Fill directly on the window, bypassing the cache.
    pub fn render_fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Color) {
        self.backend.fill_rect(Rect::new(x as i32, y as i32, width as i32, height as i32), color);
    }

    /// Unpin fonts referenced by presented frames and drop fonts whose
    /// removal was deferred by those references.
    pub fn clear_font_refs(&mut self) {
        self.fonts.clear_refs();
    }

    fn entry(&self, id: SurfaceId) -> Result<&Entry<B::Texture>> {
        self.surfaces.get(id.0).and_then(Option::as_ref).ok_or(Error::InvalidSurface)
    }

    /// Look up a live entry through the surface table alone, leaving the
    /// renderer's other fields free to borrow alongside it.
    fn entry_in(
        surfaces: &mut [Option<Entry<B::Texture>>],
        id: SurfaceId,
    ) -> Result<&mut Entry<B::Texture>> {
        surfaces.get_mut(id.0).and_then(Option::as_mut).ok_or(Error::InvalidSurface)
    }

    fn entry_mut(&mut self, id: SurfaceId) -> Result<&mut Entry<B::Texture>> {
        Self::entry_in(&mut self.surfaces, id)
    }

    fn current_entry(&mut self) -> Result<&mut Entry<B::Texture>> {
        let id = self.current.ok_or(Error::NoCurrentSurface)?;
        self.entry_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::env;
    use std::fs;

    use crate::backend::SoftwareBackend;
    use crate::font::FontOptions;

    const RED: Color = Color::rgb(255, 0, 0);

    fn renderer() -> Renderer<SoftwareBackend> {
        Renderer::new(SoftwareBackend::new(640, 480, 1))
    }

    #[test]
    fn drawing_requires_a_current_surface() {
        let mut renderer = renderer();
        assert!(matches!(renderer.set_clip_rect(0.0, 0.0, 1.0, 1.0), Err(Error::NoCurrentSurface)));
        assert!(matches!(renderer.clear_clip_rect(), Err(Error::NoCurrentSurface)));
        assert!(matches!(renderer.draw_rect(0.0, 0.0, 1.0, 1.0, RED), Err(Error::NoCurrentSurface)));
    }

    #[test]
    fn destroyed_surfaces_reject_operations() {
        let mut renderer = renderer();
        let id = renderer.create_surface(0.0, 0.0, 64.0, 64.0).unwrap();
        renderer.set_current_surface(id).unwrap();
        renderer.destroy_surface(id).unwrap();

        assert!(matches!(renderer.begin_frame(id), Err(Error::InvalidSurface)));
        assert!(matches!(renderer.draw_rect(0.0, 0.0, 1.0, 1.0, RED), Err(Error::NoCurrentSurface)));
    }

    #[test]
    fn color_sequences_parse_with_defaults() {
        assert_eq!(color_from_seq(None, 7).unwrap(), Color::new(7, 7, 7, 255));
        assert_eq!(color_from_seq(Some(&[1, 2, 3]), 0).unwrap(), Color::new(1, 2, 3, 255));
        assert_eq!(color_from_seq(Some(&[1, 2, 3, 4]), 0).unwrap(), Color::new(1, 2, 3, 4));
        assert!(matches!(
            color_from_seq(Some(&[1, 2]), 0),
            Err(Error::InvalidColor { index: 3 })
        ));
    }

    #[test]
    fn present_composites_the_surface_at_its_origin() {
        let mut renderer = renderer();
        let id = renderer.create_surface(10.0, 5.0, 96.0, 96.0).unwrap();
        renderer.set_current_surface(id).unwrap();

        renderer.begin_frame(id).unwrap();
        renderer.draw_rect(0.0, 0.0, 96.0, 96.0, RED).unwrap();
        renderer.present_surface(id).unwrap();
        renderer.present_window();

        assert_eq!(renderer.backend().pixel(10, 5), [255, 0, 0, 255]);
        assert_eq!(renderer.backend().pixel(105, 100), [255, 0, 0, 255]);
        assert_eq!(renderer.backend().pixel(9, 5), [0, 0, 0, 0]);
        assert!(renderer.backend().shown());
    }

    #[test]
    fn unchanged_frames_skip_the_upload() {
        let mut renderer = renderer();
        let id = renderer.create_surface(0.0, 0.0, 128.0, 96.0).unwrap();
        renderer.set_current_surface(id).unwrap();

        for _ in 0..2 {
            renderer.begin_frame(id).unwrap();
            renderer.draw_rect(8.0, 8.0, 16.0, 16.0, RED).unwrap();
            renderer.present_surface(id).unwrap();
        }

        let entry = renderer.surfaces[0].as_ref().unwrap();
        assert_eq!(entry.cache.dirty_rects().len(), 0);
    }

    #[test]
    fn text_pins_fonts_for_the_frame() {
        let mut renderer = renderer();
        let path = env::temp_dir().join("veneer-renderer-pin.ttf");
        fs::write(&path, b"stub font file").unwrap();

        let font = renderer.fonts_mut().load(&path, 12.0, FontOptions::default()).unwrap();
        let group = renderer.fonts().group(&[font]).unwrap();

        let id = renderer.create_surface(0.0, 0.0, 128.0, 96.0).unwrap();
        renderer.set_current_surface(id).unwrap();
        renderer.begin_frame(id).unwrap();
        let advance = renderer.draw_text(&group, "hi", 4.0, 4, RED).unwrap();
        assert_eq!(advance, 16.0);

        renderer.fonts_mut().remove(font);
        renderer.present_surface(id).unwrap();
        // The replayed frame still resolved the font; now release it.
        renderer.clear_font_refs();
        assert!(renderer.fonts().path(font).is_err());
    }

    #[test]
    fn debug_dump_writes_a_png() {
        let mut renderer = renderer();
        let id = renderer.create_surface(0.0, 0.0, 32.0, 32.0).unwrap();
        renderer.set_current_surface(id).unwrap();
        renderer.begin_frame(id).unwrap();
        renderer.draw_rect(0.0, 0.0, 32.0, 32.0, RED).unwrap();
        renderer.present_surface(id).unwrap();

        let path = env::temp_dir().join("veneer-debug-dump.png");
        renderer.save_surface_png(id, &path).unwrap();
        assert!(fs::metadata(&path).map(|meta| meta.len() > 0).unwrap());
        let _ = fs::remove_file(&path);
    }
}
