//! Grid fixtures

use halo_core::Grid;

/// Glider heading down and to the right, top-left corner of its box at `(x, y)`
///
/// ```text
/// .#.
/// ..#
/// ###
/// ```
pub fn glider(width: usize, height: usize, x: usize, y: usize) -> Grid {
    Grid::with_live_cells(
        width,
        height,
        &[(x + 1, y), (x + 2, y + 1), (x, y + 2), (x + 1, y + 2), (x + 2, y + 2)],
    )
}

/// R-pentomino centred in the grid; keeps changing for over a thousand turns
pub fn r_pentomino(width: usize, height: usize) -> Grid {
    let (x, y) = (width / 2, height / 2);
    Grid::with_live_cells(
        width,
        height,
        &[(x, y - 1), (x + 1, y - 1), (x - 1, y), (x, y), (x, y + 1)],
    )
}

/// Deterministic pseudo-random soup with roughly one live cell in three
pub fn soup(width: usize, height: usize, seed: u64) -> Grid {
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    let mut live = Vec::new();
    for y in 0..height {
        for x in 0..width {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            if (state >> 33) % 3 == 0 {
                live.push((x, y));
            }
        }
    }
    Grid::with_live_cells(width, height, &live)
}
