//! Binary PGM (`P5`) image codec
//!
//! The header must match the requested dimensions exactly and declare a
//! maxval of 255; anything else is rejected before a single cell is read.

use crate::error::{HaloError, HaloResult};
use crate::grid::Grid;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const MAGIC: &str = "P5";
const MAX_VALUE: usize = 255;

/// Decode a PGM image, checking it is `width x height`
pub fn decode(bytes: &[u8], width: usize, height: usize, path: &Path) -> HaloResult<Grid> {
    let mut cursor = 0;
    let mut fields = Vec::with_capacity(4);

    // Header: magic, width, height, maxval separated by whitespace;
    // exactly one whitespace byte follows maxval before the raster.
    while fields.len() < 4 {
        while cursor < bytes.len() && bytes[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        if cursor < bytes.len() && bytes[cursor] == b'#' {
            while cursor < bytes.len() && bytes[cursor] != b'\n' {
                cursor += 1;
            }
            continue;
        }
        let start = cursor;
        while cursor < bytes.len() && !bytes[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        if start == cursor {
            return Err(HaloError::image(path, "truncated header"));
        }
        let field = std::str::from_utf8(&bytes[start..cursor])
            .map_err(|_| HaloError::image(path, "header is not ASCII"))?;
        fields.push(field.to_owned());
    }
    cursor += 1;

    if fields[0] != MAGIC {
        return Err(HaloError::image(path, format!("not a pgm file ({})", fields[0])));
    }
    let parse = |field: &str, name: &str| {
        field
            .parse::<usize>()
            .map_err(|_| HaloError::image(path, format!("invalid {name}: {field}")))
    };
    let file_width = parse(&fields[1], "width")?;
    let file_height = parse(&fields[2], "height")?;
    let max_value = parse(&fields[3], "maxval")?;

    if file_width != width {
        return Err(HaloError::image(
            path,
            format!("incorrect width: expected {width}, got {file_width}"),
        ));
    }
    if file_height != height {
        return Err(HaloError::image(
            path,
            format!("incorrect height: expected {height}, got {file_height}"),
        ));
    }
    if max_value != MAX_VALUE {
        return Err(HaloError::image(
            path,
            format!("incorrect maxval/bit depth: {max_value}"),
        ));
    }

    let raster = bytes.get(cursor..cursor + width * height).ok_or_else(|| {
        HaloError::image(
            path,
            format!("raster truncated: expected {} bytes", width * height),
        )
    })?;
    Grid::new(width, height, raster.to_vec())
}

/// Encode a grid as a PGM image
pub fn encode(grid: &Grid) -> Vec<u8> {
    let header = format!("{MAGIC}\n{} {}\n{MAX_VALUE}\n", grid.width(), grid.height());
    let mut out = Vec::with_capacity(header.len() + grid.cells().len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(grid.cells());
    out
}

/// Read `path`, which must hold a `width x height` image
pub fn read(path: &Path, width: usize, height: usize) -> HaloResult<Grid> {
    let bytes = fs::read(path)?;
    let grid = decode(&bytes, width, height, path)?;
    debug!(path = %path.display(), alive = grid.alive_count(), "Image loaded");
    Ok(grid)
}

/// Write `grid` to `path`, creating the parent directory if needed
pub fn write(path: &Path, grid: &Grid) -> HaloResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, encode(grid))?;
    info!(path = %path.display(), "Image written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::LIVE;
    use assert_matches::assert_matches;

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("4x3x0.pgm");
        let grid = Grid::with_live_cells(4, 3, &[(0, 0), (3, 2)]);

        write(&path, &grid).unwrap();
        let loaded = read(&path, 4, 3).unwrap();
        assert_eq!(loaded, grid);
        assert_eq!(loaded.get(3, 2), LIVE);
    }

    #[test]
    fn test_header_comment_is_skipped() {
        let mut bytes = b"P5\n# written by hand\n2 1\n255\n".to_vec();
        bytes.extend_from_slice(&[0, 255]);
        let grid = decode(&bytes, 2, 1, Path::new("inline")).unwrap();
        assert_eq!(grid.alive_count(), 1);
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let bytes = encode(&Grid::dead(4, 4));
        assert_matches!(
            decode(&bytes, 4, 5, Path::new("x.pgm")),
            Err(HaloError::Image { .. })
        );
        assert_matches!(
            decode(&bytes, 5, 4, Path::new("x.pgm")),
            Err(HaloError::Image { .. })
        );
    }

    #[test]
    fn test_wrong_magic_and_depth_are_rejected() {
        let plain = b"P2\n1 1\n255\n\x00".to_vec();
        assert!(decode(&plain, 1, 1, Path::new("p2.pgm")).is_err());

        let deep = b"P5\n1 1\n65535\n\x00\x00".to_vec();
        assert!(decode(&deep, 1, 1, Path::new("deep.pgm")).is_err());
    }

    #[test]
    fn test_truncated_raster_is_rejected() {
        let bytes = b"P5\n2 2\n255\n\x00\x00".to_vec();
        assert!(decode(&bytes, 2, 2, Path::new("short.pgm")).is_err());
    }
}
