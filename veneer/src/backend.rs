//! The window backend abstraction and an in-memory software implementation.
//!
//! A backend owns the window: it creates the textures surfaces upload into,
//! composites those textures at their origins, offers a small direct-to-
//! window drawing path, and flips the finished frame. All coordinates at
//! this boundary are logical; backends apply their own drawable scale.

use std::fmt::{self, Display, Formatter};

use veneer_render::geometry::{Color, Rect};
use veneer_render::surface::Texture;

/// Backend errors.
#[derive(Debug)]
pub enum Error {
    /// The backend could not allocate a texture.
    TextureCreation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::TextureCreation(reason) => write!(f, "failed to create texture: {reason}"),
        }
    }
}

/// Window and texture operations the toolkit needs from a pixel backend.
pub trait PixelBackend {
    type Texture: Texture;

    /// Drawable pixels per logical point; integral by contract.
    fn scale(&self) -> i32;

    /// Window size in logical points.
    fn window_size(&self) -> (i32, i32);

    /// Allocate a texture of `width`×`height` drawable pixels.
    fn create_texture(&mut self, width: i32, height: i32) -> Result<Self::Texture>;

    /// Clip subsequent direct-to-window operations; `None` lifts the clip.
    fn set_clip_rect(&mut self, rect: Option<Rect>);

    /// Fill directly on the window, outside the cached pipeline.
    fn fill_rect(&mut self, rect: Rect, color: Color);

    /// Composite a surface's texture onto the window at origin `(x, y)`.
    fn render_texture(&mut self, texture: &Self::Texture, x: i32, y: i32);

    /// Flip the finished frame; the window becomes visible on first call.
    fn present(&mut self);
}

/// Texture of the software backend: plain RGBA8 memory.
#[derive(Debug)]
pub struct SoftwareTexture {
    width: i32,
    height: i32,
    pixels: Vec<u8>,
}

impl SoftwareTexture {
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

impl Texture for SoftwareTexture {
    fn upload(&mut self, rect: Rect, pixels: &[u8], stride: usize) {
        let rect = rect.intersect(Rect::new(0, 0, self.width, self.height));
        for y in rect.y..rect.y + rect.height {
            let src = (y as usize * stride + rect.x as usize) * 4;
            let dst = (y as usize * self.width as usize + rect.x as usize) * 4;
            let len = rect.width as usize * 4;
            self.pixels[dst..dst + len].copy_from_slice(&pixels[src..src + len]);
        }
    }
}

/// Headless window backend drawing into memory.
///
/// Stands in for a real windowing backend in tests and server-side hosts;
/// the "window" is just another RGBA8 buffer.
#[derive(Debug)]
pub struct SoftwareBackend {
    width: i32,
    height: i32,
    scale: i32,
    pixels: Vec<u8>,
    clip: Option<Rect>,
    shown: bool,
}

impl SoftwareBackend {
    pub fn new(width: i32, height: i32, scale: i32) -> Self {
        Self {
            width,
            height,
            scale,
            pixels: vec![0; (width * scale * height * scale * 4) as usize],
            clip: None,
            shown: false,
        }
    }

    /// Whether `present` has been called at least once.
    pub fn shown(&self) -> bool {
        self.shown
    }

    /// The window contents, RGBA8 at drawable resolution.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// One window pixel, in drawable coordinates.
    pub fn pixel(&self, x: i32, y: i32) -> [u8; 4] {
        let offset = (y * self.width * self.scale + x) as usize * 4;
        self.pixels[offset..offset + 4].try_into().unwrap()
    }

    /// Current clip in drawable pixels; the full window when unset.
    fn drawable_clip(&self) -> Rect {
        let full = Rect::new(0, 0, self.width * self.scale, self.height * self.scale);
        match self.clip {
            Some(clip) => Rect::new(
                clip.x * self.scale,
                clip.y * self.scale,
                clip.width * self.scale,
                clip.height * self.scale,
            )
            .intersect(full),
            None => full,
        }
    }
}

impl PixelBackend for SoftwareBackend {
    type Texture = SoftwareTexture;

    fn scale(&self) -> i32 {
        self.scale
    }

    fn window_size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn create_texture(&mut self, width: i32, height: i32) -> Result<SoftwareTexture> {
        Ok(SoftwareTexture { width, height, pixels: vec![0; (width * height * 4) as usize] })
    }

    fn set_clip_rect(&mut self, rect: Option<Rect>) {
        self.clip = rect;
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        let scaled =
            Rect::new(rect.x * self.scale, rect.y * self.scale, rect.width * self.scale, rect.height * self.scale);
        let rect = scaled.intersect(self.drawable_clip());
        let stride = (self.width * self.scale * 4) as usize;
        for y in rect.y..rect.y + rect.height {
            let offset = y as usize * stride;
            let row = &mut self.pixels
                [offset + rect.x as usize * 4..offset + (rect.x + rect.width) as usize * 4];
            for pixel in row.chunks_exact_mut(4) {
                pixel.copy_from_slice(&[color.r, color.g, color.b, 255]);
            }
        }
    }

    fn render_texture(&mut self, texture: &SoftwareTexture, x: i32, y: i32) {
        let dest = Rect::new(x * self.scale, y * self.scale, texture.width, texture.height)
            .intersect(self.drawable_clip());
        let stride = (self.width * self.scale * 4) as usize;
        for row in 0..dest.height {
            let tex_y = row + dest.y - y * self.scale;
            let tex_x = dest.x - x * self.scale;
            let src = ((tex_y * texture.width + tex_x) * 4) as usize;
            let dst = (dest.y + row) as usize * stride + dest.x as usize * 4;
            let len = (dest.width * 4) as usize;
            self.pixels[dst..dst + len].copy_from_slice(&texture.pixels[src..src + len]);
        }
    }

    fn present(&mut self) {
        self.shown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_upload_copies_the_sub_region() {
        let mut backend = SoftwareBackend::new(8, 8, 1);
        let mut texture = backend.create_texture(4, 4).unwrap();

        // A 4x4 red source buffer.
        let source: Vec<u8> = [255, 0, 0, 255].repeat(16);
        texture.upload(Rect::new(1, 1, 2, 2), &source, 4);

        assert_eq!(&texture.pixels()[0..4], &[0, 0, 0, 0]);
        let offset = (1 * 4 + 1) * 4;
        assert_eq!(&texture.pixels()[offset..offset + 4], &[255, 0, 0, 255]);
    }

    #[test]
    fn render_texture_composites_at_the_origin() {
        let mut backend = SoftwareBackend::new(8, 8, 1);
        let mut texture = backend.create_texture(2, 2).unwrap();
        let source: Vec<u8> = [9, 9, 9, 255].repeat(4);
        texture.upload(Rect::new(0, 0, 2, 2), &source, 2);

        backend.render_texture(&texture, 3, 4);
        assert_eq!(backend.pixel(3, 4), [9, 9, 9, 255]);
        assert_eq!(backend.pixel(4, 5), [9, 9, 9, 255]);
        assert_eq!(backend.pixel(2, 4), [0, 0, 0, 0]);
    }

    #[test]
    fn window_fill_honors_the_clip() {
        let mut backend = SoftwareBackend::new(8, 8, 1);
        backend.set_clip_rect(Some(Rect::new(0, 0, 2, 2)));
        backend.fill_rect(Rect::new(0, 0, 8, 8), Color::rgb(1, 2, 3));

        assert_eq!(backend.pixel(1, 1), [1, 2, 3, 255]);
        assert_eq!(backend.pixel(2, 2), [0, 0, 0, 0]);

        backend.set_clip_rect(None);
        backend.fill_rect(Rect::new(0, 0, 8, 8), Color::rgb(1, 2, 3));
        assert_eq!(backend.pixel(7, 7), [1, 2, 3, 255]);
    }

    #[test]
    fn first_present_shows_the_window() {
        let mut backend = SoftwareBackend::new(4, 4, 2);
        assert!(!backend.shown());
        backend.present();
        assert!(backend.shown());
    }
}
