//! Block-cyclic distributed matrices.
//!
//! A matrix is dealt out over a 2D process grid in fixed-size blocks,
//! round-robin in both dimensions: element `(i, j)` belongs to grid cell
//! `((i / row_bs) % grid_rows, (j / col_bs) % grid_cols)`. The
//! [`BlockCyclicLayout`] descriptor is pure data (every rank can resolve
//! any element's owner and local position from it), while
//! [`BlockCyclicMatrix`] pairs a layout with a live [`ProcessGrid`] and the
//! local element storage. The transform engine treats matrices as
//! read-only.

use crate::error::{BandwagonError, Result};
use crate::grid::{cart_rank, ProcessGrid};
use crate::scalar::Scalar;
use crate::split::CyclicSplit;

/// Pure descriptor of a block-cyclic distribution over a `grid_rows x
/// grid_cols` process grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCyclicLayout {
    rows: usize,
    cols: usize,
    row_bs: usize,
    col_bs: usize,
    grid_rows: usize,
    grid_cols: usize,
}

impl BlockCyclicLayout {
    pub fn new(
        rows: usize,
        cols: usize,
        row_bs: usize,
        col_bs: usize,
        grid_rows: usize,
        grid_cols: usize,
    ) -> Result<Self> {
        if row_bs == 0 || col_bs == 0 {
            return Err(BandwagonError::Config(format!(
                "cyclic block size {row_bs}x{col_bs} must be positive"
            )));
        }
        if grid_rows == 0 || grid_cols == 0 {
            return Err(BandwagonError::Config(format!(
                "process grid {grid_rows}x{grid_cols} must be non-empty"
            )));
        }
        Ok(Self {
            rows,
            cols,
            row_bs,
            col_bs,
            grid_rows,
            grid_cols,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row_block_size(&self) -> usize {
        self.row_bs
    }

    pub fn col_block_size(&self) -> usize {
        self.col_bs
    }

    pub fn grid_rows(&self) -> usize {
        self.grid_rows
    }

    pub fn grid_cols(&self) -> usize {
        self.grid_cols
    }

    /// Row splitter for a grid row rank, over the first `prefix` rows.
    ///
    /// The tile loop of the transform differences two prefix splitters to
    /// get the local extent of an arbitrary row panel.
    pub fn spl_row_prefix(&self, prefix: usize, rank_row: usize) -> CyclicSplit {
        CyclicSplit::new(prefix, self.grid_rows, rank_row, self.row_bs)
    }

    /// Column splitter for a grid column rank, over the first `prefix`
    /// columns.
    pub fn spl_col_prefix(&self, prefix: usize, rank_col: usize) -> CyclicSplit {
        CyclicSplit::new(prefix, self.grid_cols, rank_col, self.col_bs)
    }

    /// Full row splitter for a grid row rank.
    pub fn spl_row(&self, rank_row: usize) -> CyclicSplit {
        self.spl_row_prefix(self.rows, rank_row)
    }

    /// Full column splitter for a grid column rank.
    pub fn spl_col(&self, rank_col: usize) -> CyclicSplit {
        self.spl_col_prefix(self.cols, rank_col)
    }

    /// Grid cell `(rank_row, rank_col)` owning element `(i, j)`.
    pub fn owner(&self, i: usize, j: usize) -> (usize, usize) {
        (
            (i / self.row_bs) % self.grid_rows,
            (j / self.col_bs) % self.grid_cols,
        )
    }

    /// Flat rank (column-major grid order) owning element `(i, j)`.
    pub fn owner_rank(&self, i: usize, j: usize) -> usize {
        let (r, c) = self.owner(i, j);
        cart_rank(r, c, self.grid_rows)
    }
}

/// Local shard of a block-cyclic matrix, plus the grid it lives on.
///
/// Storage is column-major with leading dimension equal to the local row
/// count.
pub struct BlockCyclicMatrix<T: Scalar> {
    layout: BlockCyclicLayout,
    grid: ProcessGrid,
    local_rows: usize,
    local_cols: usize,
    data: Vec<T>,
}

impl<T: Scalar> BlockCyclicMatrix<T> {
    pub fn new(
        grid: ProcessGrid,
        rows: usize,
        cols: usize,
        row_bs: usize,
        col_bs: usize,
    ) -> Result<Self> {
        let layout = BlockCyclicLayout::new(
            rows,
            cols,
            row_bs,
            col_bs,
            grid.num_rows(),
            grid.num_cols(),
        )?;
        let local_rows = layout.spl_row(grid.my_row()).local_size();
        let local_cols = layout.spl_col(grid.my_col()).local_size();
        Ok(Self {
            layout,
            grid,
            local_rows,
            local_cols,
            data: vec![T::zero(); local_rows * local_cols],
        })
    }

    pub fn layout(&self) -> &BlockCyclicLayout {
        &self.layout
    }

    pub fn grid(&self) -> &ProcessGrid {
        &self.grid
    }

    pub fn num_local_rows(&self) -> usize {
        self.local_rows
    }

    pub fn num_local_cols(&self) -> usize {
        self.local_cols
    }

    pub fn local(&self) -> &[T] {
        &self.data
    }

    pub fn local_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Element at local position `(lr, lc)`.
    pub fn at(&self, lr: usize, lc: usize) -> T {
        self.data[lr + lc * self.local_rows]
    }

    /// Populate the local shard from a function of global indices.
    pub fn fill(&mut self, f: impl Fn(usize, usize) -> T) {
        let spl_r = self.layout.spl_row(self.grid.my_row());
        let spl_c = self.layout.spl_col(self.grid.my_col());
        let my_row = self.grid.my_row();
        let my_col = self.grid.my_col();
        for lc in 0..self.local_cols {
            let j = spl_c.global_index(my_col, lc);
            for lr in 0..self.local_rows {
                let i = spl_r.global_index(my_row, lr);
                self.data[lr + lc * self.local_rows] = f(i, j);
            }
        }
    }
}
