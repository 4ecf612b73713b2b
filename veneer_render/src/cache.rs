//! The retained-mode render cache.
//!
//! Drawing calls are recorded into the command buffer while the host builds
//! its frame. `end_frame` hashes every visible command into the cell grid,
//! diffs the grid against the previous frame, merges the changed cells into
//! dirty rectangles and replays the whole command stream once per rectangle,
//! clipped so no pixel outside the dirty regions is touched.

use crate::command::{Command, CommandBuffer};
use crate::font::{FontGroup, FontLibrary};
use crate::geometry::{Color, Rect};
use crate::grid::{CellGrid, CELLS_X, CELLS_Y, CELL_SIZE};
use crate::surface::Surface;

/// Capacity of the merged dirty-rect buffer.
const RECT_BUF_CAPACITY: usize = CELLS_X * CELLS_Y / 2;

/// Seed of the debug-overlay color generator. Fixed, so overlay colors are
/// reproducible across runs.
const DEBUG_RNG_SEED: u32 = 0x2545_f491;

/// Try to merge `rect` into the newest overlapping entry; append otherwise.
///
/// Returns `false` when the buffer holds `capacity` entries and the rect
/// was dropped.
fn push_rect(rects: &mut Vec<Rect>, rect: Rect, capacity: usize) -> bool {
    for merged in rects.iter_mut().rev() {
        if merged.overlaps(rect) {
            *merged = merged.union(rect);
            return true;
        }
    }
    if rects.len() == capacity {
        return false;
    }
    rects.push(rect);
    true
}

/// Per-surface cache of recorded commands and cell hashes.
///
/// A cache lives and dies with its surface and is only ever driven from the
/// thread owning both.
#[derive(Debug)]
pub struct RenderCache {
    commands: CommandBuffer,
    grid: CellGrid,
    rects: Vec<Rect>,
    rect_capacity: usize,
    screen_rect: Rect,
    last_clip_rect: Rect,
    show_debug: bool,
    debug_rng: u32,
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderCache {
    pub fn new() -> Self {
        Self {
            commands: CommandBuffer::new(),
            grid: CellGrid::new(),
            rects: Vec::with_capacity(RECT_BUF_CAPACITY),
            rect_capacity: RECT_BUF_CAPACITY,
            screen_rect: Rect::default(),
            last_clip_rect: Rect::default(),
            show_debug: false,
            debug_rng: DEBUG_RNG_SEED,
        }
    }

    /// Current surface bounds as seen by the last `begin_frame`.
    #[inline]
    pub fn screen_rect(&self) -> Rect {
        self.screen_rect
    }

    /// Whether command recording failed this frame for lack of memory.
    #[inline]
    pub fn resize_issue(&self) -> bool {
        self.commands.resize_issue()
    }

    /// The dirty rectangles produced by the last `end_frame`.
    #[inline]
    pub fn dirty_rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Overlay every dirty rectangle with a translucent color during replay.
    pub fn set_show_debug(&mut self, enabled: bool) {
        self.show_debug = enabled;
    }

    /// Cap the command arena, for hosts that bound its memory use.
    pub fn set_command_buffer_limit(&mut self, limit: Option<usize>) {
        self.commands.set_size_limit(limit);
    }

    /// Force a full redraw on the next frame.
    pub fn invalidate(&mut self) {
        self.grid.invalidate();
    }

    /// Start recording a frame targeting `surface`.
    pub fn begin_frame<S: Surface>(&mut self, surface: &S) {
        self.commands.clear_resize_issue();

        // Reset all cells if the surface size has changed.
        let (width, height) = surface.size();
        if self.screen_rect.width != width || self.screen_rect.height != height {
            self.screen_rect.width = width;
            self.screen_rect.height = height;
            self.invalidate();
        }
        self.last_clip_rect = self.screen_rect;
    }

    /// Record a clip change; the stored rect is pre-clamped to the screen.
    pub fn set_clip_rect(&mut self, rect: Rect) {
        let clipped = rect.intersect(self.screen_rect);
        if self.commands.push_set_clip(clipped) {
            self.last_clip_rect = clipped;
        }
    }

    /// Record a filled rectangle. Degenerate or fully clipped rects are
    /// dropped without recording anything.
    pub fn draw_rect(&mut self, rect: Rect, color: Color) {
        if rect.is_empty() || !self.last_clip_rect.overlaps(rect) {
            return;
        }
        self.commands.push_draw_rect(rect, color);
    }

    /// Record a text run and return the advanced pen position.
    ///
    /// The x position is fractional so horizontal kerning can accumulate
    /// across calls; y stays integral to avoid vertical jitter. The advance
    /// is returned even when the run is clipped out, so callers keep a
    /// consistent cursor.
    pub fn draw_text(
        &mut self,
        fonts: &dyn FontLibrary,
        group: &FontGroup,
        text: &str,
        x: f64,
        y: i32,
        color: Color,
    ) -> f64 {
        let (width, x_offset) = fonts.group_width(group, text);
        let rect = Rect {
            x: (x + f64::from(x_offset)) as i32,
            y,
            width: (width - f64::from(x_offset)) as i32,
            height: fonts.group_height(group),
        };
        if self.last_clip_rect.overlaps(rect) {
            let tab_size = fonts.group_tab_size(group);
            self.commands.push_draw_text(rect, color, group, x as f32, tab_size, text);
        }
        x + width
    }

    /// Diff the frame against the previous one and redraw the changed
    /// regions onto `surface`.
    pub fn end_frame<S: Surface>(&mut self, surface: &mut S, fonts: &mut dyn FontLibrary) {
        // Update cells from the commands visible after clipping.
        let mut clip = self.screen_rect;
        for cmd in self.commands.iter() {
            if let Command::SetClip { rect } = cmd.decode() {
                clip = rect;
            }
            let rect = cmd.rect().intersect(clip);
            if rect.is_empty() {
                continue;
            }
            self.grid.mark(rect, cmd.bytes());
        }

        // Collect the changed cells into merged rectangles.
        self.rects.clear();
        let rects = &mut self.rects;
        let capacity = self.rect_capacity;
        let mut overflowed = false;
        self.grid.sweep_dirty(self.screen_rect, |cell| {
            if !overflowed {
                overflowed = !push_rect(rects, cell, capacity);
            }
        });
        if overflowed {
            // Some changed cells were dropped and stay stale this frame;
            // poison the baseline so the next frame repaints everything.
            self.grid.poison_current();
        }

        // Expand the rects from cells to pixels.
        for rect in &mut self.rects {
            rect.x *= CELL_SIZE;
            rect.y *= CELL_SIZE;
            rect.width *= CELL_SIZE;
            rect.height *= CELL_SIZE;
            *rect = rect.intersect(self.screen_rect);
        }

        // Redraw the updated regions.
        for i in 0..self.rects.len() {
            let region = self.rects[i];
            surface.set_clip_rect(region);

            for cmd in self.commands.iter() {
                match cmd.decode() {
                    Command::SetClip { rect } => {
                        surface.set_clip_rect(rect.intersect(region));
                    },
                    Command::DrawRect { rect, color } => {
                        surface.draw_rect(rect, color);
                    },
                    Command::DrawText { rect, color, fonts: group, text_x, tab_size, text } => {
                        fonts.set_group_tab_size(&group, tab_size);
                        surface.draw_text(&*fonts, &group, text, f64::from(text_x), rect.y, color);
                    },
                }
            }

            if self.show_debug {
                let color = self.debug_color();
                surface.set_clip_rect(region);
                surface.draw_rect(region, color);
            }
        }
    }

    /// Upload the dirty regions from the surface's pixel buffer into its
    /// texture. A no-op when nothing changed.
    pub fn update_rects<S: Surface>(&mut self, surface: &mut S) {
        if !self.rects.is_empty() {
            surface.upload(&self.rects);
        }
    }

    /// Make this frame's cell hashes the baseline and rewind the command
    /// buffer for the next frame.
    pub fn swap_buffers(&mut self) {
        self.grid.swap();
        self.commands.reset();
    }

    /// Next translucent overlay color (xorshift32).
    fn debug_color(&mut self) -> Color {
        let mut x = self.debug_rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.debug_rng = x;
        Color::new(x as u8, (x >> 8) as u8, (x >> 16) as u8, 50)
    }
}
