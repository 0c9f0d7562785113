//! Global (ghost-free) fields and the double-buffered tile pair.

use crate::data::tile::Tile;

/// Dense `rows × cols` row-major grid without ghost cells.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalField {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl GlobalField {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Wrap `data`; `None` if its length is not `rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Mutable view of the contiguous block of rows `start..start + count`.
    pub fn rows_mut(&mut self, start: usize, count: usize) -> &mut [f64] {
        &mut self.data[start * self.cols..(start + count) * self.cols]
    }
}

/// Current and next timestep buffers of a double-buffered stencil scheme.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldPair {
    pub current: Tile,
    pub next: Tile,
}

impl FieldPair {
    /// Both buffers start as copies of `tile`.
    pub fn duplicated(tile: Tile) -> Self {
        Self {
            next: tile.clone(),
            current: tile,
        }
    }

    /// Exchange the buffers after a timestep.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next);
    }
}
