//! The offscreen surface: an RGBA8 pixel buffer with an attached texture.
//!
//! Drawing primitives write into the pixel buffer at drawable resolution;
//! `upload` copies the changed sub-regions into the texture, and the window
//! backend later composites that texture at the surface's origin. The
//! surface knows nothing about the render cache driving it.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use veneer_render::font::{FontGroup, FontLibrary};
use veneer_render::geometry::{Color, Rect};
use veneer_render::surface::{Surface as RenderTarget, Texture};

#[derive(Debug)]
pub struct Surface<T> {
    pixels: Vec<u8>,
    width: i32,
    height: i32,
    scale: i32,
    x: i32,
    y: i32,
    clip: Rect,
    texture: T,
}

impl<T: Texture> Surface<T> {
    /// Create a surface of `width`×`height` logical pixels at origin
    /// `(x, y)`, backed by `texture` (already sized at drawable scale).
    pub fn new(texture: T, x: i32, y: i32, width: i32, height: i32, scale: i32) -> Self {
        Self {
            pixels: vec![0; (width * scale * height * scale * 4) as usize],
            width,
            height,
            scale,
            x,
            y,
            clip: Rect::new(0, 0, width, height),
            texture,
        }
    }

    /// Origin and logical size within the window.
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    #[inline]
    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn set_position(&mut self, x: i32, y: i32) {
        self.x = x;
        self.y = y;
    }

    #[inline]
    pub fn scale(&self) -> i32 {
        self.scale
    }

    #[inline]
    pub fn texture(&self) -> &T {
        &self.texture
    }

    /// The raw RGBA8 pixel buffer, at drawable resolution.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Swap in a new texture and pixel buffer for the new size. The caller
    /// owns cache invalidation; it follows from the size change at the next
    /// `begin_frame`.
    pub fn resize(&mut self, texture: T, width: i32, height: i32) {
        self.texture = texture;
        self.width = width;
        self.height = height;
        self.pixels = vec![0; (width * self.scale * height * self.scale * 4) as usize];
        self.clip = Rect::new(0, 0, width, height);
    }

    /// Dump the pixel buffer as a PNG, for debugging.
    pub fn save_png(&self, path: &Path) -> Result<(), png::EncodingError> {
        let file = BufWriter::new(File::create(path)?);
        let mut encoder =
            png::Encoder::new(file, (self.width * self.scale) as u32, (self.height * self.scale) as u32);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.pixels)?;
        Ok(())
    }

    /// Blend a span of drawable pixels in place (source-over).
    fn blend_row(row: &mut [u8], color: Color) {
        let Color { r, g, b, a } = color;
        if a == 255 {
            for pixel in row.chunks_exact_mut(4) {
                pixel.copy_from_slice(&[r, g, b, 255]);
            }
        } else {
            let a = u32::from(a);
            for pixel in row.chunks_exact_mut(4) {
                pixel[0] = ((u32::from(r) * a + u32::from(pixel[0]) * (255 - a)) / 255) as u8;
                pixel[1] = ((u32::from(g) * a + u32::from(pixel[1]) * (255 - a)) / 255) as u8;
                pixel[2] = ((u32::from(b) * a + u32::from(pixel[2]) * (255 - a)) / 255) as u8;
                pixel[3] = (a + u32::from(pixel[3]) * (255 - a) / 255) as u8;
            }
        }
    }
}

impl<T: Texture> RenderTarget for Surface<T> {
    fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn set_clip_rect(&mut self, rect: Rect) {
        self.clip = rect.intersect(Rect::new(0, 0, self.width, self.height));
    }

    fn draw_rect(&mut self, rect: Rect, color: Color) {
        let rect = rect.intersect(self.clip);
        if rect.is_empty() || color.a == 0 {
            return;
        }

        let scale = self.scale;
        let stride = (self.width * scale * 4) as usize;
        let x0 = (rect.x * scale * 4) as usize;
        let x1 = ((rect.x + rect.width) * scale * 4) as usize;
        for y in rect.y * scale..(rect.y + rect.height) * scale {
            let offset = y as usize * stride;
            Self::blend_row(&mut self.pixels[offset + x0..offset + x1], color);
        }
    }

    fn draw_text(
        &mut self,
        fonts: &dyn FontLibrary,
        group: &FontGroup,
        text: &str,
        x: f64,
        y: i32,
        color: Color,
    ) {
        // Placeholder block glyphs from the metrics model; a rasterizing
        // backend replaces this with real glyph blitting.
        let height = fonts.group_height(group);
        let mut pen = x;
        let mut utf8 = [0; 4];
        for c in text.chars() {
            let (advance, _) = fonts.group_width(group, c.encode_utf8(&mut utf8));
            if !c.is_whitespace() && advance > 0.0 {
                self.draw_rect(Rect::from_points(pen, f64::from(y), advance, f64::from(height)), color);
            }
            pen += advance;
        }
    }

    fn upload(&mut self, rects: &[Rect]) {
        let scale = self.scale;
        let stride = (self.width * scale) as usize;
        for rect in rects {
            let scaled =
                Rect::new(rect.x * scale, rect.y * scale, rect.width * scale, rect.height * scale);
            self.texture.upload(scaled, &self.pixels, stride);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct TestTexture {
        uploads: Vec<Rect>,
    }

    impl Texture for TestTexture {
        fn upload(&mut self, rect: Rect, _pixels: &[u8], _stride: usize) {
            self.uploads.push(rect);
        }
    }

    fn pixel(surface: &Surface<TestTexture>, x: i32, y: i32) -> [u8; 4] {
        let stride = (surface.width * surface.scale * 4) as usize;
        let offset = y as usize * stride + x as usize * 4;
        surface.pixels[offset..offset + 4].try_into().unwrap()
    }

    #[test]
    fn opaque_fill_writes_the_clip_masked_region() {
        let mut surface = Surface::new(TestTexture::default(), 0, 0, 16, 16, 1);
        surface.set_clip_rect(Rect::new(0, 0, 8, 8));
        surface.draw_rect(Rect::new(4, 4, 8, 8), Color::rgb(10, 20, 30));

        assert_eq!(pixel(&surface, 4, 4), [10, 20, 30, 255]);
        assert_eq!(pixel(&surface, 7, 7), [10, 20, 30, 255]);
        // Outside the clip, nothing happened.
        assert_eq!(pixel(&surface, 8, 8), [0, 0, 0, 0]);
    }

    #[test]
    fn translucent_fill_blends() {
        let mut surface = Surface::new(TestTexture::default(), 0, 0, 4, 4, 1);
        surface.draw_rect(Rect::new(0, 0, 4, 4), Color::rgb(255, 255, 255));
        surface.draw_rect(Rect::new(0, 0, 4, 4), Color::new(0, 0, 0, 128));

        // (0 * 128 + 255 * 127) / 255 = 127.
        assert_eq!(pixel(&surface, 0, 0), [127, 127, 127, 255]);
    }

    #[test]
    fn upload_applies_the_scale() {
        let mut surface = Surface::new(TestTexture::default(), 0, 0, 16, 16, 2);
        surface.upload(&[Rect::new(1, 2, 3, 4)]);

        assert_eq!(surface.texture.uploads, vec![Rect::new(2, 4, 6, 8)]);
    }

    #[test]
    fn scaled_fill_covers_drawable_pixels() {
        let mut surface = Surface::new(TestTexture::default(), 0, 0, 8, 8, 2);
        surface.draw_rect(Rect::new(1, 1, 2, 2), Color::rgb(5, 5, 5));

        assert_eq!(pixel(&surface, 2, 2), [5, 5, 5, 255]);
        assert_eq!(pixel(&surface, 5, 5), [5, 5, 5, 255]);
        assert_eq!(pixel(&surface, 6, 6), [0, 0, 0, 0]);
    }
}
