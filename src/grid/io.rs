//! Reader and writer for the ASCII raster format.
//!
//! Layout: six header lines (`ncols`, `nrows`, `xllcorner`, `yllcorner`,
//! `cellsize`, `nodata_value`; keys matched case-insensitively), then cell
//! values in row-major scan order. A path ending in `.gz` holds the same
//! stream gzip-compressed. Cell values equal to the declared nodata
//! sentinel load as nodata; writing substitutes the sentinel back.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;

use super::{Grid, GridHeader, Mask};

/// The sentinel written for nodata cells in every output artifact.
pub const DEFAULT_NODATA: f64 = -9999.0;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("i/o failure on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed raster {path}: {reason}")]
    Format { path: PathBuf, reason: String },
    #[error(
        "extent mismatch for {path}: raster is {found_cols}x{found_rows}, \
         active mask is {want_cols}x{want_rows}"
    )]
    ExtentMismatch {
        path: PathBuf,
        found_cols: usize,
        found_rows: usize,
        want_cols: usize,
        want_rows: usize,
    },
}

impl GridError {
    fn io(path: &Path, source: std::io::Error) -> GridError {
        GridError::Io { path: path.to_path_buf(), source }
    }

    fn format(path: &Path, reason: impl Into<String>) -> GridError {
        GridError::Format { path: path.to_path_buf(), reason: reason.into() }
    }
}

/// Loads a raster. When a mask is given, the declared extent must agree
/// with the mask's extent and every cell outside the mask is forced to
/// nodata regardless of its file value.
pub fn read(path: &Path, mask: Option<&Mask>) -> Result<Grid, GridError> {
    let text = read_to_string(path)?;
    let mut tokens = text.split_whitespace();

    let mut header_field = |key: &str| -> Result<String, GridError> {
        let found = tokens
            .next()
            .ok_or_else(|| GridError::format(path, format!("missing header line '{key}'")))?;
        if !found.eq_ignore_ascii_case(key) {
            return Err(GridError::format(
                path,
                format!("expected header key '{key}', found '{found}'"),
            ));
        }
        tokens
            .next()
            .map(str::to_owned)
            .ok_or_else(|| GridError::format(path, format!("missing value for '{key}'")))
    };

    let ncols = parse_count(path, "ncols", &header_field("ncols")?)?;
    let nrows = parse_count(path, "nrows", &header_field("nrows")?)?;
    if ncols == 0 || nrows == 0 {
        return Err(GridError::format(
            path,
            format!("degenerate extent {ncols}x{nrows}"),
        ));
    }
    let xll = parse_number(path, "xllcorner", &header_field("xllcorner")?)?;
    let yll = parse_number(path, "yllcorner", &header_field("yllcorner")?)?;
    let cellsize = parse_number(path, "cellsize", &header_field("cellsize")?)?;
    let nodata = parse_number(path, "nodata_value", &header_field("nodata_value")?)?;

    let header = GridHeader { ncols, nrows, xll, yll, cellsize };

    if let Some(mask) = mask {
        let want = mask.header();
        if !header.same_shape(want) {
            return Err(GridError::ExtentMismatch {
                path: path.to_path_buf(),
                found_cols: ncols,
                found_rows: nrows,
                want_cols: want.ncols,
                want_rows: want.nrows,
            });
        }
    }

    let length = header.length();
    let mut cells = Vec::with_capacity(length);
    for i in 0..length {
        let token = tokens
            .next()
            .ok_or_else(|| GridError::format(path, format!("expected {length} cells, found {i}")))?;
        let value = parse_number(path, "cell", token)?;
        cells.push(if value == nodata { None } else { Some(value) });
    }
    if tokens.next().is_some() {
        return Err(GridError::format(path, format!("trailing data after {length} cells")));
    }

    let mut grid = Grid::from_cells(header, cells);
    if let Some(mask) = mask {
        grid.apply_mask(mask);
    }
    Ok(grid)
}

/// Serializes all cells of `grid`, substituting `nodata_value` for the
/// nodata marker. Row-major, one raster row per line.
pub fn write(
    grid: &Grid,
    path: &Path,
    nodata_value: f64,
    compress: bool,
) -> Result<(), GridError> {
    let file = File::create(path).map_err(|e| GridError::io(path, e))?;
    if compress {
        let mut out = GzEncoder::new(BufWriter::new(file), Compression::default());
        write_stream(grid, &mut out, nodata_value).map_err(|e| GridError::io(path, e))?;
        // Writes the gzip trailer; dropping instead would swallow errors.
        let mut inner = out.finish().map_err(|e| GridError::io(path, e))?;
        inner.flush().map_err(|e| GridError::io(path, e))
    } else {
        let mut out = BufWriter::new(file);
        write_stream(grid, &mut out, nodata_value).map_err(|e| GridError::io(path, e))?;
        out.flush().map_err(|e| GridError::io(path, e))
    }
}

fn write_stream(grid: &Grid, out: &mut dyn Write, nodata_value: f64) -> std::io::Result<()> {
    let h = grid.header();
    writeln!(out, "ncols {}", h.ncols)?;
    writeln!(out, "nrows {}", h.nrows)?;
    writeln!(out, "xllcorner {}", h.xll)?;
    writeln!(out, "yllcorner {}", h.yll)?;
    writeln!(out, "cellsize {}", h.cellsize)?;
    writeln!(out, "nodata_value {}", nodata_value)?;

    for row in grid.cells().chunks(h.ncols) {
        let mut first = true;
        for cell in row {
            if !first {
                write!(out, " ")?;
            }
            first = false;
            match cell {
                // `{}` on f64 is shortest round-trip formatting, so a
                // written grid reloads to the identical values.
                Some(v) => write!(out, "{}", v)?,
                None => write!(out, "{}", nodata_value)?,
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

fn read_to_string(path: &Path) -> Result<String, GridError> {
    let mut file = File::open(path).map_err(|e| GridError::io(path, e))?;
    let mut text = String::new();
    let gzipped = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    if gzipped {
        GzDecoder::new(file)
            .read_to_string(&mut text)
            .map_err(|e| GridError::io(path, e))?;
    } else {
        file.read_to_string(&mut text).map_err(|e| GridError::io(path, e))?;
    }
    Ok(text)
}

fn parse_count(path: &Path, what: &str, token: &str) -> Result<usize, GridError> {
    token
        .parse::<usize>()
        .map_err(|_| GridError::format(path, format!("invalid {what} '{token}'")))
}

fn parse_number(path: &Path, what: &str, token: &str) -> Result<f64, GridError> {
    token
        .parse::<f64>()
        .map_err(|_| GridError::format(path, format!("invalid {what} value '{token}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::test_header;
    use rstest::rstest;
    use std::fs;

    fn sample_grid() -> Grid {
        Grid::from_cells(
            test_header(3, 2),
            vec![Some(1.5), None, Some(-2.0), Some(0.0), Some(123.456789), None],
        )
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_round_trip(#[case] compress: bool) {
        let dir = tempfile::tempdir().unwrap();
        let name = if compress { "g.asc.gz" } else { "g.asc" };
        let path = dir.path().join(name);

        let grid = sample_grid();
        write(&grid, &path, DEFAULT_NODATA, compress).unwrap();
        let reloaded = read(&path, None).unwrap();

        assert_eq!(reloaded, grid);
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_round_trip_under_mask(#[case] compress: bool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(if compress { "g.asc.gz" } else { "g.asc" });

        // Mask admits only cells 0 and 4.
        let mask_grid = Grid::from_cells(
            test_header(3, 2),
            vec![Some(1.0), None, Some(0.0), None, Some(1.0), None],
        );
        let mask = Mask::from_grid(&mask_grid);

        write(&sample_grid(), &path, DEFAULT_NODATA, compress).unwrap();
        let reloaded = read(&path, Some(&mask)).unwrap();

        assert_eq!(reloaded.get(0), Some(1.5));
        assert_eq!(reloaded.get(4), Some(123.456789));
        // Every out-of-mask cell reads as nodata regardless of file content.
        for i in [1, 2, 3, 5] {
            assert_eq!(reloaded.get(i), None, "cell {i}");
        }
    }

    #[test]
    fn test_sentinel_cells_load_as_nodata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.asc");
        fs::write(
            &path,
            "ncols 2\nnrows 1\nxllcorner 0\nyllcorner 0\ncellsize 1\nnodata_value -9999\n-9999 3\n",
        )
        .unwrap();

        let grid = read(&path, None).unwrap();
        assert_eq!(grid.get(0), None);
        assert_eq!(grid.get(1), Some(3.0));
    }

    #[rstest]
    #[case("ncols 0\nnrows 2\n")]
    #[case("ncols 3\nnrows 0\n")]
    fn test_degenerate_extent_is_a_format_error(#[case] head: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.asc");
        fs::write(
            &path,
            format!("{head}xllcorner 0\nyllcorner 0\ncellsize 1\nnodata_value -9999\n"),
        )
        .unwrap();

        // A zero-sized extent must be rejected at load; letting it through
        // would leave the writer with no rows to chunk the cells into.
        let err = read(&path, None).unwrap_err();
        assert!(matches!(err, GridError::Format { .. }), "got {err}");
    }

    #[test]
    fn test_malformed_header_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.asc");
        fs::write(&path, "nclos 2\nnrows 1\n").unwrap();

        let err = read(&path, None).unwrap_err();
        assert!(matches!(err, GridError::Format { .. }), "got {err}");
    }

    #[test]
    fn test_short_cell_data_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.asc");
        fs::write(
            &path,
            "ncols 3\nnrows 1\nxllcorner 0\nyllcorner 0\ncellsize 1\nnodata_value -9999\n1 2\n",
        )
        .unwrap();

        let err = read(&path, None).unwrap_err();
        assert!(matches!(err, GridError::Format { .. }), "got {err}");
    }

    #[test]
    fn test_extent_mismatch_against_mask() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.asc");
        write(&sample_grid(), &path, DEFAULT_NODATA, false).unwrap();

        let mask = Mask::from_grid(&Grid::filled(test_header(2, 2), 1.0));
        let err = read(&path, Some(&mask)).unwrap_err();
        assert!(matches!(err, GridError::ExtentMismatch { .. }), "got {err}");
    }
}
