//! The spatial hash grid used to diff consecutive frames.
//!
//! The screen is divided into [`CELL_SIZE`]-pixel tiles. Every visible
//! command mixes a hash of its record bytes into each tile it touches; a
//! tile whose hash differs from the previous frame's is dirty. The grid is
//! double-buffered so the baseline swap at the end of a frame is O(1).

use crate::geometry::Rect;

/// Grid columns.
pub const CELLS_X: usize = 80;

/// Grid rows.
pub const CELLS_Y: usize = 50;

/// Edge length of one cell, in logical pixels.
pub const CELL_SIZE: i32 = 96;

/// FNV-1a 32-bit offset basis.
pub const HASH_INITIAL: u32 = 2166136261;

const FNV_PRIME: u32 = 16777619;

/// Mix `data` into `h` with FNV-1a.
#[inline]
fn fnv1a(h: &mut u32, data: &[u8]) {
    for &byte in data {
        *h = (*h ^ u32::from(byte)).wrapping_mul(FNV_PRIME);
    }
}

#[inline]
fn cell_idx(x: usize, y: usize) -> usize {
    x + y * CELLS_X
}

/// Double-buffered per-cell hashes for the current and previous frame.
#[derive(Debug)]
pub struct CellGrid {
    cells: Box<[u32]>,
    cells_prev: Box<[u32]>,
}

impl Default for CellGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl CellGrid {
    pub fn new() -> Self {
        // Both buffers start at the hash of an empty cell, so a pair of
        // identical frames diffs clean even right after creation. The
        // initial full repaint comes from the resize invalidation instead.
        Self {
            cells: vec![HASH_INITIAL; CELLS_X * CELLS_Y].into_boxed_slice(),
            cells_prev: vec![HASH_INITIAL; CELLS_X * CELLS_Y].into_boxed_slice(),
        }
    }

    /// Force every cell to diff dirty on the next sweep.
    pub fn invalidate(&mut self) {
        self.cells_prev.fill(0xffff_ffff);
    }

    /// Hash one command's record bytes and mix the result into every cell
    /// overlapped by `rect`. Coverage outside the grid is ignored.
    pub fn mark(&mut self, rect: Rect, record: &[u8]) {
        let mut h = HASH_INITIAL;
        fnv1a(&mut h, record);

        let x1 = (rect.x / CELL_SIZE).max(0);
        let y1 = (rect.y / CELL_SIZE).max(0);
        let x2 = ((rect.x + rect.width) / CELL_SIZE).min(CELLS_X as i32 - 1);
        let y2 = ((rect.y + rect.height) / CELL_SIZE).min(CELLS_Y as i32 - 1);

        for y in y1..=y2 {
            for x in x1..=x2 {
                fnv1a(&mut self.cells[cell_idx(x as usize, y as usize)], &h.to_le_bytes());
            }
        }
    }

    /// Emit a 1×1 cell rect for every cell that changed since the previous
    /// frame, and reset the swept baseline so the next frame starts clean.
    ///
    /// Only the cells covering `screen` are visited.
    pub fn sweep_dirty(&mut self, screen: Rect, mut emit: impl FnMut(Rect)) {
        let max_x = ((screen.width / CELL_SIZE + 1) as usize).min(CELLS_X);
        let max_y = ((screen.height / CELL_SIZE + 1) as usize).min(CELLS_Y);

        for y in 0..max_y {
            for x in 0..max_x {
                let idx = cell_idx(x, y);
                if self.cells[idx] != self.cells_prev[idx] {
                    emit(Rect::new(x as i32, y as i32, 1, 1));
                }
                self.cells_prev[idx] = HASH_INITIAL;
            }
        }
    }

    /// Make this frame's hashes the baseline for the next frame.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.cells, &mut self.cells_prev);
    }

    /// Poison the hashes just produced, so that after [`swap`] the next
    /// frame's diff sees every cell as changed.
    ///
    /// [`swap`]: Self::swap
    pub fn poison_current(&mut self) {
        self.cells.fill(0xffff_ffff);
    }
}
