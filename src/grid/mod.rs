//! Masked numeric raster: the one data structure every other module is
//! built on. A `Grid` is a fixed-length cell array where each cell is
//! either a value or nodata; a `Mask` restricts the active spatial domain.

pub mod algebra;
pub mod io;

pub use io::GridError;

/// Raster extent. Every grid in one pipeline run shares a single header;
/// the engine rejects any input raster that disagrees with it.
#[derive(Debug, Clone, PartialEq)]
pub struct GridHeader {
    pub ncols: usize,
    pub nrows: usize,
    pub xll: f64,
    pub yll: f64,
    pub cellsize: f64,
}

impl GridHeader {
    pub fn length(&self) -> usize {
        self.ncols * self.nrows
    }

    /// Two headers describe the same cell array when their shape matches.
    /// Origin and cell size are carried through for the output files but do
    /// not participate in the check.
    pub fn same_shape(&self, other: &GridHeader) -> bool {
        self.ncols == other.ncols && self.nrows == other.nrows
    }
}

/// A masked raster. Cells are stored in row-major scan order; `None` is the
/// nodata marker.
///
/// A `Grid` is an independent value: `clone()` is the deep duplicate that
/// the pipeline uses to protect a source grid before handing it to an
/// in-place combinator.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    header: GridHeader,
    cells: Vec<Option<f64>>,
}

impl Grid {
    /// Builds a grid from raw cells. The cell count must equal the header
    /// length; this is only reachable from the reader and from tests.
    pub fn from_cells(header: GridHeader, cells: Vec<Option<f64>>) -> Grid {
        debug_assert_eq!(header.length(), cells.len());
        Grid { header, cells }
    }

    /// An all-nodata grid of the given extent.
    pub fn empty(header: GridHeader) -> Grid {
        let len = header.length();
        Grid { header, cells: vec![None; len] }
    }

    /// A grid with every cell set to `value`.
    pub fn filled(header: GridHeader, value: f64) -> Grid {
        let len = header.length();
        Grid { header, cells: vec![Some(value); len] }
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell accessor; `None` for cells outside the domain.
    pub fn get(&self, i: usize) -> Option<f64> {
        self.cells[i]
    }

    pub fn set(&mut self, i: usize, v: f64) {
        self.cells[i] = Some(v);
    }

    pub fn set_nodata(&mut self, i: usize) {
        self.cells[i] = None;
    }

    pub fn cells(&self) -> &[Option<f64>] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [Option<f64>] {
        &mut self.cells
    }

    /// Forces every cell outside `mask` to nodata. Applied once, at load
    /// time; derived grids inherit the masked state from their parents.
    pub fn apply_mask(&mut self, mask: &Mask) {
        for (i, cell) in self.cells.iter_mut().enumerate() {
            if !mask.in_domain(i) {
                *cell = None;
            }
        }
    }
}

/// The set of cell indices that belong to the active spatial domain.
///
/// Built from a mask raster: a cell is in-domain when the mask holds a
/// non-zero data value there.
#[derive(Debug, Clone)]
pub struct Mask {
    header: GridHeader,
    in_domain: Vec<bool>,
}

impl Mask {
    pub fn from_grid(grid: &Grid) -> Mask {
        let in_domain = grid
            .cells()
            .iter()
            .map(|c| matches!(c, Some(v) if *v != 0.0))
            .collect();
        Mask { header: grid.header().clone(), in_domain }
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    pub fn in_domain(&self, i: usize) -> bool {
        self.in_domain[i]
    }

    /// Number of in-domain cells.
    pub fn domain_size(&self) -> usize {
        self.in_domain.iter().filter(|d| **d).count()
    }
}

#[cfg(test)]
pub(crate) fn test_header(ncols: usize, nrows: usize) -> GridHeader {
    GridHeader { ncols, nrows, xll: 0.0, yll: 0.0, cellsize: 0.5 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_forces_cells_to_nodata() {
        let header = test_header(2, 2);
        // Mask raster: cell 0 is nodata, cell 1 is zero, cells 2/3 are set.
        let mask_grid = Grid::from_cells(
            header.clone(),
            vec![None, Some(0.0), Some(1.0), Some(2.0)],
        );
        let mask = Mask::from_grid(&mask_grid);
        assert_eq!(mask.domain_size(), 2);

        let mut grid = Grid::filled(header, 7.0);
        grid.apply_mask(&mask);
        assert_eq!(grid.get(0), None);
        assert_eq!(grid.get(1), None);
        assert_eq!(grid.get(2), Some(7.0));
        assert_eq!(grid.get(3), Some(7.0));
    }

    #[test]
    fn test_duplicate_is_independent() {
        let mut a = Grid::filled(test_header(2, 1), 1.0);
        let b = a.clone();
        a.set(0, 99.0);
        a.set_nodata(1);
        assert_eq!(b.get(0), Some(1.0));
        assert_eq!(b.get(1), Some(1.0));
    }
}
