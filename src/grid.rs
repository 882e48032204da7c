//! 2D process grid carved out of a base communication group.
//!
//! The grid factorizes a group of `rows * cols` processes into rows and
//! columns with column-major rank placement (rank `r` sits at row
//! `r % rows`, column `r / rows`, the BLACS `"C"` convention). Row and
//! column sub-groups are derived once, at construction, and are the
//! communicators the redistribution engine scopes its exchanges to.
//!
//! The coordinate maps are closed-form arithmetic; [`cart_rank`] and
//! [`cart_coords`] are exposed as free functions so layout descriptors and
//! tests can resolve ownership without a live communication group.

use crate::comm::CommGroup;
use crate::error::{BandwagonError, Result};

/// Flat rank of the process at `(row, col)` in a column-major grid.
pub fn cart_rank(row: usize, col: usize, rows: usize) -> usize {
    col * rows + row
}

/// `(row, col)` coordinates of a flat rank in a column-major grid.
pub fn cart_coords(rank: usize, rows: usize) -> (usize, usize) {
    (rank % rows, rank / rows)
}

/// A `rows x cols` grid over a base communication group.
pub struct ProcessGrid {
    rows: usize,
    cols: usize,
    my_row: usize,
    my_col: usize,
    base: Box<dyn CommGroup>,
    row_comm: Box<dyn CommGroup>,
    col_comm: Box<dyn CommGroup>,
}

impl std::fmt::Debug for ProcessGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessGrid")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("my_row", &self.my_row)
            .field("my_col", &self.my_col)
            .finish()
    }
}

impl ProcessGrid {
    /// Build a grid over `base`.
    ///
    /// Fails with a `Config` error when `rows * cols` does not equal the
    /// base group size; the check runs before any collective, so no rank
    /// enters a split it would have to abandon.
    pub fn new(base: Box<dyn CommGroup>, rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 || rows * cols != base.size() {
            return Err(BandwagonError::Config(format!(
                "grid {rows}x{cols} does not factor a group of {} processes",
                base.size()
            )));
        }
        let (my_row, my_col) = cart_coords(base.rank(), rows);
        // One split per dimension: same row -> one group (spanning the
        // columns), same column -> the other.
        let row_comm = base.split(my_row, my_col)?;
        let col_comm = base.split(my_col, my_row)?;
        Ok(Self {
            rows,
            cols,
            my_row,
            my_col,
            base,
            row_comm,
            col_comm,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn num_cols(&self) -> usize {
        self.cols
    }

    pub fn my_row(&self) -> usize {
        self.my_row
    }

    pub fn my_col(&self) -> usize {
        self.my_col
    }

    /// Size of the base group (`rows * cols`).
    pub fn size(&self) -> usize {
        self.rows * self.cols
    }

    /// Flat rank of the process at `(row, col)`.
    pub fn rank_of(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.rows && col < self.cols);
        cart_rank(row, col, self.rows)
    }

    /// The base group spanning the whole grid.
    pub fn comm(&self) -> &dyn CommGroup {
        self.base.as_ref()
    }

    /// Group of the processes in this process's row (one per column).
    pub fn row_comm(&self) -> &dyn CommGroup {
        self.row_comm.as_ref()
    }

    /// Group of the processes in this process's column (one per row).
    pub fn col_comm(&self) -> &dyn CommGroup {
        self.col_comm.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SelfComm;

    #[test]
    fn cart_maps_invert() {
        for rows in 1..=4 {
            for cols in 1..=4 {
                for r in 0..rows * cols {
                    let (row, col) = cart_coords(r, rows);
                    assert!(row < rows && col < cols);
                    assert_eq!(cart_rank(row, col, rows), r);
                }
            }
        }
    }

    #[test]
    fn cart_rank_is_column_major() {
        // 2x3 grid: ranks 0,1 fill column 0, ranks 2,3 column 1, ...
        assert_eq!(cart_rank(0, 0, 2), 0);
        assert_eq!(cart_rank(1, 0, 2), 1);
        assert_eq!(cart_rank(0, 1, 2), 2);
        assert_eq!(cart_rank(1, 2, 2), 5);
    }

    #[test]
    fn single_process_grid() {
        let grid = ProcessGrid::new(Box::new(SelfComm), 1, 1).unwrap();
        assert_eq!(grid.num_rows(), 1);
        assert_eq!(grid.num_cols(), 1);
        assert_eq!(grid.my_row(), 0);
        assert_eq!(grid.my_col(), 0);
        assert_eq!(grid.rank_of(0, 0), 0);
        assert_eq!(grid.row_comm().size(), 1);
        assert_eq!(grid.col_comm().size(), 1);
    }

    #[test]
    fn mismatched_factorization_is_config_error() {
        let err = ProcessGrid::new(Box::new(SelfComm), 2, 2).unwrap_err();
        assert!(
            matches!(err, BandwagonError::Config(_)),
            "expected config error, got: {err}"
        );
        let err = ProcessGrid::new(Box::new(SelfComm), 0, 1).unwrap_err();
        assert!(matches!(err, BandwagonError::Config(_)));
    }
}
