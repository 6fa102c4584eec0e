//! Collection of sparse matrix contributions
//! and their compaction into row-compressed form.
//!
//! Contributions are only ever appended during assembly.
//! Compaction sums duplicate entries, drops the ones that cancel out,
//! and produces an immutable CSR matrix
//! which is what the diffusion driver and the linear solvers work with.

use nalgebra_sparse as nas;

/// Error in compacting a sparse system.
#[derive(thiserror::Error, Debug)]
pub enum SystemError {
    /// A contribution was outside the bounds of the system.
    #[error("invalid sparse system entries: {0}")]
    InvalidEntries(#[from] nas::SparseFormatError),
}

/// Append-only collection of (row, column, value) contributions
/// to a square sparse matrix.
///
/// Diagonal seeds are kept separately from the general contributions
/// but are merged into the same matrix when compacting.
#[derive(Clone, Debug, Default)]
pub struct SystemBuilder {
    size: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
    diagonal: Vec<(usize, f64)>,
}

impl SystemBuilder {
    /// Create an empty builder for a `size` by `size` system.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    /// Number of rows (and columns) in the system.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Add a contribution to the entry at `(row, col)`.
    #[inline]
    pub fn push(&mut self, row: usize, col: usize, value: f64) {
        self.rows.push(row);
        self.cols.push(col);
        self.values.push(value);
    }

    /// Add a contribution to the diagonal entry of `row`.
    #[inline]
    pub fn push_diagonal(&mut self, row: usize, value: f64) {
        self.diagonal.push((row, value));
    }

    /// Number of contributions collected so far, including diagonal seeds.
    #[inline]
    pub fn contribution_count(&self) -> usize {
        self.values.len() + self.diagonal.len()
    }

    /// Merge all contributions into a CSR matrix.
    ///
    /// Contributions to the same entry are summed,
    /// and entries whose absolute value is not greater than `epsilon` afterwards
    /// are left out of the matrix.
    /// Rows and the columns within each row are in ascending order.
    pub fn compact(self, epsilon: f64) -> Result<nas::CsrMatrix<f64>, SystemError> {
        let Self {
            size,
            mut rows,
            mut cols,
            mut values,
            diagonal,
        } = self;
        for (row, val) in diagonal {
            rows.push(row);
            cols.push(row);
            values.push(val);
        }

        // the COO to CSR conversion sorts the entries and sums duplicates for us
        let coo = nas::CooMatrix::try_from_triplets(size, size, rows, cols, values)?;
        let csr = nas::CsrMatrix::from(&coo);
        Ok(csr.filter(|_, _, val| val.abs() > epsilon))
    }
}
