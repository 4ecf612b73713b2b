//! The packed command buffer.
//!
//! All drawing operations of a frame are recorded as variable-length records
//! in a single byte arena. Records are encoded explicitly (little-endian)
//! rather than transmuted, so the arena can be hashed and replayed without
//! any layout assumptions. The arena grows geometrically and is reused from
//! frame to frame without freeing.

use std::cmp;
use std::str;

use log::warn;

use crate::font::{FontGroup, FONT_FALLBACK_MAX};
use crate::geometry::{Color, Rect};

/// Alignment of every record offset and record size within the arena.
pub const RECORD_ALIGN: usize = 16;

/// Size of the arena allocated by the first push.
const INIT_SIZE: usize = 512 * 1024;

/// Geometric growth factor applied when the arena is full.
const RESIZE_RATE: f64 = 1.2;

/// Record header: `kind: u32` followed by `size: u32`.
const HEADER_SIZE: usize = 8;

/// Every payload starts with the command rect at this offset.
const RECT_OFFSET: usize = HEADER_SIZE;
const RECT_SIZE: usize = 16;

/// Payload offsets shared by the rect and text commands.
const COLOR_OFFSET: usize = RECT_OFFSET + RECT_SIZE;

/// Text command payload tail: font slots, pen x, length, tab size, bytes.
const FONTS_OFFSET: usize = COLOR_OFFSET + 4;
const TEXT_X_OFFSET: usize = FONTS_OFFSET + FONT_FALLBACK_MAX * 4;
const LEN_OFFSET: usize = TEXT_X_OFFSET + 4;
const TAB_OFFSET: usize = LEN_OFFSET + 8;
const TEXT_OFFSET: usize = TAB_OFFSET + 1;

const KIND_SET_CLIP: u32 = 0;
const KIND_DRAW_TEXT: u32 = 1;
const KIND_DRAW_RECT: u32 = 2;

/// A drawing command decoded from the arena.
#[derive(Debug, Copy, Clone)]
pub enum Command<'a> {
    SetClip {
        rect: Rect,
    },
    DrawRect {
        rect: Rect,
        color: Color,
    },
    DrawText {
        rect: Rect,
        color: Color,
        fonts: FontGroup,
        text_x: f32,
        tab_size: i8,
        text: &'a str,
    },
}

/// Borrowed view of one packed record.
#[derive(Debug, Copy, Clone)]
pub struct CommandRef<'a> {
    bytes: &'a [u8],
}

impl<'a> CommandRef<'a> {
    /// The full record bytes, header and padding included.
    ///
    /// This is exactly what the cell hash covers, so identical commands
    /// produce identical hashes and any differing byte changes them.
    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The command rect, readable without decoding the kind.
    #[inline]
    pub fn rect(&self) -> Rect {
        get_rect(self.bytes, RECT_OFFSET)
    }

    pub fn decode(&self) -> Command<'a> {
        let rect = self.rect();
        match get_u32(self.bytes, 0) {
            KIND_SET_CLIP => Command::SetClip { rect },
            KIND_DRAW_RECT => Command::DrawRect { rect, color: get_color(self.bytes, COLOR_OFFSET) },
            KIND_DRAW_TEXT => {
                let mut slots = [0; FONT_FALLBACK_MAX];
                for (i, slot) in slots.iter_mut().enumerate() {
                    *slot = get_u32(self.bytes, FONTS_OFFSET + i * 4);
                }
                let len = get_u64(self.bytes, LEN_OFFSET) as usize;
                let text = &self.bytes[TEXT_OFFSET..TEXT_OFFSET + len];
                Command::DrawText {
                    rect,
                    color: get_color(self.bytes, COLOR_OFFSET),
                    fonts: FontGroup::from_slots(slots),
                    text_x: f32::from_le_bytes(self.bytes[TEXT_X_OFFSET..TEXT_X_OFFSET + 4].try_into().unwrap()),
                    tab_size: self.bytes[TAB_OFFSET] as i8,
                    // The encoder only ever stores `&str` contents.
                    text: str::from_utf8(text).expect("command buffer holds invalid utf-8"),
                }
            },
            kind => unreachable!("unknown command kind {kind}"),
        }
    }
}

/// Append-only arena of packed drawing commands.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    buf: Vec<u8>,
    idx: usize,
    limit: Option<usize>,
    resize_issue: bool,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the arena at `limit` bytes; growth beyond it fails like an
    /// allocator would, recording a resize issue for the frame.
    pub fn set_size_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Byte offset one past the last record.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.idx
    }

    /// Current arena allocation in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Whether a push failed to grow the arena this frame.
    #[inline]
    pub fn resize_issue(&self) -> bool {
        self.resize_issue
    }

    /// Re-arm recording at the start of a frame.
    pub fn clear_resize_issue(&mut self) {
        self.resize_issue = false;
    }

    /// Rewind the cursor; the allocation is kept for the next frame.
    pub fn reset(&mut self) {
        self.idx = 0;
    }

    pub fn push_set_clip(&mut self, rect: Rect) -> bool {
        match self.push(KIND_SET_CLIP, RECT_SIZE) {
            Some(record) => {
                put_rect(record, RECT_OFFSET, rect);
                true
            },
            None => false,
        }
    }

    pub fn push_draw_rect(&mut self, rect: Rect, color: Color) -> bool {
        match self.push(KIND_DRAW_RECT, RECT_SIZE + 4) {
            Some(record) => {
                put_rect(record, RECT_OFFSET, rect);
                put_color(record, COLOR_OFFSET, color);
                true
            },
            None => false,
        }
    }

    pub fn push_draw_text(
        &mut self,
        rect: Rect,
        color: Color,
        fonts: &FontGroup,
        text_x: f32,
        tab_size: i8,
        text: &str,
    ) -> bool {
        // Text bytes are stored inline, NUL-terminated.
        let payload = TEXT_OFFSET - HEADER_SIZE + text.len() + 1;
        match self.push(KIND_DRAW_TEXT, payload) {
            Some(record) => {
                put_rect(record, RECT_OFFSET, rect);
                put_color(record, COLOR_OFFSET, color);
                for (i, slot) in fonts.slots().iter().enumerate() {
                    put_u32(record, FONTS_OFFSET + i * 4, *slot);
                }
                record[TEXT_X_OFFSET..TEXT_X_OFFSET + 4].copy_from_slice(&text_x.to_le_bytes());
                record[LEN_OFFSET..LEN_OFFSET + 8].copy_from_slice(&(text.len() as u64).to_le_bytes());
                record[TAB_OFFSET] = tab_size as u8;
                record[TEXT_OFFSET..TEXT_OFFSET + text.len()].copy_from_slice(text.as_bytes());
                true
            },
            None => false,
        }
    }

    /// Walk the recorded commands in insertion order.
    #[inline]
    pub fn iter(&self) -> Commands<'_> {
        Commands { buf: &self.buf, offset: 0, end: self.idx }
    }

    /// Reserve an aligned, zeroed record and write its header.
    fn push(&mut self, kind: u32, payload_size: usize) -> Option<&mut [u8]> {
        if self.resize_issue {
            // A previous push already failed; drop the rest of the frame so
            // partial content never reaches the screen.
            return None;
        }

        let size = (HEADER_SIZE + payload_size + RECORD_ALIGN - 1) & !(RECORD_ALIGN - 1);
        let end = self.idx + size;
        while end > self.buf.len() {
            if !self.grow() {
                self.resize_issue = true;
                return None;
            }
        }

        let record = &mut self.buf[self.idx..end];
        record.fill(0);
        record[0..4].copy_from_slice(&kind.to_le_bytes());
        record[4..8].copy_from_slice(&(size as u32).to_le_bytes());
        self.idx = end;
        Some(record)
    }

    fn grow(&mut self) -> bool {
        let new_size = cmp::max(INIT_SIZE, (self.buf.len() as f64 * RESIZE_RATE) as usize);
        if self.limit.is_some_and(|limit| new_size > limit) {
            warn!("unable to resize command buffer ({new_size} bytes)");
            return false;
        }
        self.buf.resize(new_size, 0);
        true
    }
}

/// Forward cursor over the records of one frame.
pub struct Commands<'a> {
    buf: &'a [u8],
    offset: usize,
    end: usize,
}

impl<'a> Iterator for Commands<'a> {
    type Item = CommandRef<'a>;

    fn next(&mut self) -> Option<CommandRef<'a>> {
        if self.offset >= self.end {
            return None;
        }
        let size = get_u32(self.buf, self.offset + 4) as usize;
        let bytes = &self.buf[self.offset..self.offset + size];
        self.offset += size;
        Some(CommandRef { bytes })
    }
}

#[inline]
fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn put_rect(buf: &mut [u8], offset: usize, rect: Rect) {
    put_u32(buf, offset, rect.x as u32);
    put_u32(buf, offset + 4, rect.y as u32);
    put_u32(buf, offset + 8, rect.width as u32);
    put_u32(buf, offset + 12, rect.height as u32);
}

#[inline]
fn put_color(buf: &mut [u8], offset: usize, color: Color) {
    buf[offset..offset + 4].copy_from_slice(&[color.r, color.g, color.b, color.a]);
}

#[inline]
fn get_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

#[inline]
fn get_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap())
}

#[inline]
fn get_rect(buf: &[u8], offset: usize) -> Rect {
    Rect {
        x: get_u32(buf, offset) as i32,
        y: get_u32(buf, offset + 4) as i32,
        width: get_u32(buf, offset + 8) as i32,
        height: get_u32(buf, offset + 12) as i32,
    }
}

#[inline]
fn get_color(buf: &[u8], offset: usize) -> Color {
    Color { r: buf[offset], g: buf[offset + 1], b: buf[offset + 2], a: buf[offset + 3] }
}
