//! Toroidal cell grid
//!
//! Cells are stored row-major, one byte each. Only two values are meaningful:
//! [`DEAD`] and [`LIVE`]; anything non-zero is read back as live by the rule.

use crate::error::{HaloError, HaloResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte value of a dead cell
pub const DEAD: u8 = 0;
/// Byte value of a live cell
pub const LIVE: u8 = 255;

/// Rectangular grid of cells, wrapping on both axes
///
/// Decoding goes through [`Grid::new`], so a grid whose cell count does not
/// match its dimensions never leaves the deserializer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGrid")]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

/// Unchecked wire form of [`Grid`]
#[derive(Deserialize)]
struct RawGrid {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl TryFrom<RawGrid> for Grid {
    type Error = HaloError;

    fn try_from(raw: RawGrid) -> HaloResult<Self> {
        Grid::new(raw.width, raw.height, raw.cells)
    }
}

impl Grid {
    /// Create a grid from raw row-major cells
    pub fn new(width: usize, height: usize, cells: Vec<u8>) -> HaloResult<Self> {
        if cells.len() != width * height {
            return Err(HaloError::invalid_grid(format!(
                "expected {} cells for {width}x{height}, got {}",
                width * height,
                cells.len()
            )));
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Create a grid whose cell count is already known to match
    pub(crate) fn from_parts(width: usize, height: usize, cells: Vec<u8>) -> Self {
        debug_assert_eq!(cells.len(), width * height);
        Self {
            width,
            height,
            cells,
        }
    }

    /// Create an all-dead grid
    pub fn dead(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![DEAD; width * height],
        }
    }

    /// Build a grid from a list of equally sized rows
    pub fn from_rows<R: AsRef<[u8]>>(rows: &[R]) -> HaloResult<Self> {
        let width = rows.first().map_or(0, |row| row.as_ref().len());
        let mut cells = Vec::with_capacity(width * rows.len());
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != width {
                return Err(HaloError::invalid_grid(format!(
                    "row {y} has {} cells, expected {width}",
                    row.len()
                )));
            }
            cells.extend_from_slice(row);
        }
        Ok(Self {
            width,
            height: rows.len(),
            cells,
        })
    }

    /// Build a grid with the given cells set live; coordinates are `(x, y)`
    pub fn with_live_cells(width: usize, height: usize, live: &[(usize, usize)]) -> Self {
        let mut grid = Self::dead(width, height);
        for &(x, y) in live {
            grid.set(x % width.max(1), y % height.max(1), LIVE);
        }
        grid
    }

    /// Grid width in cells
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in rows
    pub fn height(&self) -> usize {
        self.height
    }

    /// Row `y` as a slice
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.width;
        &self.cells[start..start + self.width]
    }

    /// Iterate over rows top to bottom
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        // chunks_exact panics on zero; an empty-width grid has no cells anyway
        self.cells.chunks_exact(self.width.max(1))
    }

    /// Cell at `(x, y)`
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.cells[y * self.width + x]
    }

    /// Set cell at `(x, y)`
    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        self.cells[y * self.width + x] = value;
    }

    /// Raw row-major cells
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Consume the grid, returning its row-major cells
    pub fn into_cells(self) -> Vec<u8> {
        self.cells
    }

    /// Number of live cells
    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|&&cell| cell == LIVE).count()
    }

    /// Coordinates `(x, y)` of every live cell, in row-major order
    pub fn alive_cells(&self) -> Vec<(usize, usize)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &cell)| cell == LIVE)
            .map(|(i, _)| (i % self.width, i / self.width))
            .collect()
    }

    /// Append the rows `[start, end)` of this grid to `out`
    pub fn extend_rows_into(&self, start: usize, end: usize, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.cells[start * self.width..end * self.width]);
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Grid {}x{}", self.width, self.height)?;
        for row in self.rows() {
            let line: String = row
                .iter()
                .map(|&cell| if cell == LIVE { '#' } else { '.' })
                .collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_wrong_cell_count() {
        assert!(Grid::new(4, 4, vec![DEAD; 15]).is_err());
        assert!(Grid::new(4, 4, vec![DEAD; 16]).is_ok());
    }

    #[test]
    fn test_from_rows_rejects_ragged_rows() {
        let rows: Vec<Vec<u8>> = vec![vec![0, 0, 0], vec![0, 0]];
        assert!(Grid::from_rows(&rows).is_err());
    }

    #[test]
    fn test_alive_cells_reports_coordinates() {
        let grid = Grid::with_live_cells(5, 3, &[(4, 0), (1, 2)]);
        assert_eq!(grid.alive_count(), 2);
        assert_eq!(grid.alive_cells(), vec![(4, 0), (1, 2)]);
        assert_eq!(grid.row(2), &[DEAD, LIVE, DEAD, DEAD, DEAD]);
    }
}
