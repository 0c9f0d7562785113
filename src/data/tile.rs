//! Process-local field tile with a one-cell ghost border.
//!
//! A `Tile` stores `(rows + 2) × (cols + 2)` values in row-major order.
//! Indexing with `(row, col)` uses padded coordinates: row `0` and row
//! `rows + 1` are ghost rows, likewise for columns. The interior is
//! `1..=rows × 1..=cols`.

use crate::algs::decomposition::Decomposition;
use crate::heat_error::HeatIoError;
use std::ops::{Index, IndexMut};

/// Width of the ghost border on every side.
pub const GHOST_WIDTH: usize = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Tile {
    /// Zero-filled tile with `rows × cols` interior cells.
    pub fn allocate(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; (rows + 2 * GHOST_WIDTH) * (cols + 2 * GHOST_WIDTH)],
        }
    }

    /// Tile sized for this rank's share of `decomposition`.
    pub fn for_decomposition(decomposition: &Decomposition) -> Self {
        Self::allocate(decomposition.local_rows(), decomposition.local_cols())
    }

    /// Interior row count.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Interior column count.
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn padded_rows(&self) -> usize {
        self.rows + 2 * GHOST_WIDTH
    }

    pub fn padded_cols(&self) -> usize {
        self.cols + 2 * GHOST_WIDTH
    }

    /// Whole padded buffer, ghosts included.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Interior row `i` (0-based), ghost columns excluded.
    pub fn interior_row(&self, i: usize) -> &[f64] {
        let start = (i + GHOST_WIDTH) * self.padded_cols() + GHOST_WIDTH;
        &self.data[start..start + self.cols]
    }

    fn interior_row_mut(&mut self, i: usize) -> &mut [f64] {
        let start = (i + GHOST_WIDTH) * self.padded_cols() + GHOST_WIDTH;
        let cols = self.cols;
        &mut self.data[start..start + cols]
    }

    /// Interior values packed row-major, ghosts excluded.
    pub fn interior_to_vec(&self) -> Vec<f64> {
        (0..self.rows)
            .flat_map(|i| self.interior_row(i).iter().copied())
            .collect()
    }

    /// Overwrite the interior from a packed `rows × cols` buffer.
    pub fn copy_interior_from(&mut self, values: &[f64]) -> Result<(), HeatIoError> {
        if values.len() != self.rows * self.cols {
            return Err(HeatIoError::MalformedInput(format!(
                "interior needs {} values, got {}",
                self.rows * self.cols,
                values.len()
            )));
        }
        if self.cols == 0 {
            return Ok(());
        }
        for (i, src) in values.chunks_exact(self.cols).enumerate() {
            self.interior_row_mut(i).copy_from_slice(src);
        }
        Ok(())
    }

    /// Zero-gradient boundary: every ghost cell copies its nearest interior
    /// neighbour. Rows are mirrored first across the full padded width, then
    /// columns across all padded rows, so corners take the row-mirrored value.
    pub fn fill_ghosts_zero_gradient(&mut self) {
        if self.rows == 0 || self.cols == 0 {
            return;
        }
        let width = self.padded_cols();
        let last = self.rows + 1;

        let (top, rest) = self.data.split_at_mut(width);
        top.copy_from_slice(&rest[..width]);
        let (body, bottom) = self.data.split_at_mut(last * width);
        bottom.copy_from_slice(&body[(last - 1) * width..]);

        for row in self.data.chunks_exact_mut(width) {
            row[0] = row[1];
            row[width - 1] = row[width - 2];
        }
    }
}

impl Index<(usize, usize)> for Tile {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        assert!(row < self.padded_rows() && col < self.padded_cols());
        &self.data[row * self.padded_cols() + col]
    }
}

impl IndexMut<(usize, usize)> for Tile {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        assert!(row < self.padded_rows() && col < self.padded_cols());
        let width = self.padded_cols();
        &mut self.data[row * width + col]
    }
}
