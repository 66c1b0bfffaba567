//! Game of Life transition rule
//!
//! A pure function over a whole grid. Both axes wrap, so when it is applied to
//! a strip the halo rows see each other as neighbours; their new values are
//! meaningless and the merger throws them away.

use crate::grid::{Grid, DEAD, LIVE};

/// Compute the next generation of `grid`
pub fn step(grid: &Grid) -> Grid {
    let width = grid.width();
    let height = grid.height();
    let mut next = Grid::dead(width, height);
    if width == 0 || height == 0 {
        return next;
    }

    for y in 0..height {
        let up = (y + height - 1) % height;
        let down = (y + 1) % height;
        for x in 0..width {
            let left = (x + width - 1) % width;
            let right = (x + 1) % width;

            let neighbours = [
                (left, up),
                (x, up),
                (right, up),
                (left, y),
                (right, y),
                (left, down),
                (x, down),
                (right, down),
            ];
            let count = neighbours
                .iter()
                .filter(|&&(nx, ny)| grid.get(nx, ny) != DEAD)
                .count();

            let alive = grid.get(x, y) != DEAD;
            let next_state = match (alive, count) {
                (true, 2) | (true, 3) => LIVE,
                (false, 3) => LIVE,
                _ => DEAD,
            };
            next.set(x, y, next_state);
        }
    }
    next
}

/// Apply [`step`] `turns` times
pub fn run(grid: &Grid, turns: u64) -> Grid {
    let mut current = grid.clone();
    for _ in 0..turns {
        current = step(&current);
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blinker_oscillates() {
        let horizontal = Grid::with_live_cells(5, 5, &[(1, 2), (2, 2), (3, 2)]);
        let vertical = Grid::with_live_cells(5, 5, &[(2, 1), (2, 2), (2, 3)]);

        assert_eq!(step(&horizontal), vertical);
        assert_eq!(step(&vertical), horizontal);
    }

    #[test]
    fn test_block_is_still_life() {
        let block = Grid::with_live_cells(6, 6, &[(2, 2), (3, 2), (2, 3), (3, 3)]);
        assert_eq!(run(&block, 10), block);
    }

    #[test]
    fn test_neighbours_wrap_around_edges() {
        // Blinker split across the left/right seam
        let seam = Grid::with_live_cells(5, 5, &[(4, 2), (0, 2), (1, 2)]);
        let expected = Grid::with_live_cells(5, 5, &[(0, 1), (0, 2), (0, 3)]);
        assert_eq!(step(&seam), expected);
    }

    #[test]
    fn test_lonely_cell_dies() {
        let grid = Grid::with_live_cells(4, 4, &[(1, 1)]);
        assert_eq!(step(&grid).alive_count(), 0);
    }
}
