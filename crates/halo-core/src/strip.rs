//! Halo strips: building them out of a grid and stitching results back
//!
//! A strip is the rows one worker owns plus one halo row on each side, taken
//! from the neighbouring strip or wrapped from the opposite edge of the grid.

use crate::error::{HaloError, HaloResult};
use crate::grid::Grid;
use crate::partition::Partition;

/// Halo rows added around every strip (one above, one below)
pub const HALO_ROWS: usize = 2;

/// Build the haloed strip for worker `index`
///
/// The result has `partition.size(index) + 2` rows.
pub fn build_strip(grid: &Grid, partition: &Partition, index: usize) -> Grid {
    let height = grid.height();
    let width = grid.width();
    let range = partition.range(index);

    let above = (range.start + height - 1) % height;
    let below = range.end % height;

    let mut cells = Vec::with_capacity((range.len() + HALO_ROWS) * width);
    grid.extend_rows_into(above, above + 1, &mut cells);
    grid.extend_rows_into(range.start, range.end, &mut cells);
    grid.extend_rows_into(below, below + 1, &mut cells);

    Grid::from_parts(width, range.len() + HALO_ROWS, cells)
}

/// Build every worker's strip, in worker order
pub fn build_strips(grid: &Grid, partition: &Partition) -> Vec<Grid> {
    (0..partition.len())
        .map(|index| build_strip(grid, partition, index))
        .collect()
}

/// Drop the halo rows from each strip and concatenate them in worker order
pub fn merge_strips(strips: &[Grid], partition: &Partition, width: usize) -> HaloResult<Grid> {
    if strips.len() != partition.len() {
        return Err(HaloError::invalid_grid(format!(
            "expected {} strips, got {}",
            partition.len(),
            strips.len()
        )));
    }

    let height = partition.height();
    let mut cells = Vec::with_capacity(width * height);
    for (index, strip) in strips.iter().enumerate() {
        let size = partition.size(index);
        if strip.height() != size + HALO_ROWS {
            return Err(HaloError::strip_shape(
                index,
                format!("expected {} rows, got {}", size + HALO_ROWS, strip.height()),
            ));
        }
        if strip.width() != width {
            return Err(HaloError::strip_shape(
                index,
                format!("expected width {width}, got {}", strip.width()),
            ));
        }
        strip.extend_rows_into(1, size + 1, &mut cells);
    }

    Grid::new(width, height, cells)
}
