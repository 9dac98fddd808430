//! Sparse constraint/variable incidence with dual row and column views.
//!
//! Each nonzero of the incidence carries a stable integer id, dense in
//! `0..nnz`, that addresses the parallel coefficient (`A`) and preference
//! (`P`) arrays owned by the kernels. Both views expose the same id for a
//! given nonzero, so a row update dirties exactly the entries that later
//! column sweeps will read.

use sprs::TriMat;

use crate::merge::MergedConstraint;

/// CSR-plus-CSC incidence over the merged constraints.
///
/// Ids are assigned row-major: the entries of row `k` hold consecutive
/// ids, in ascending column order (merged constraints keep their elements
/// sorted by variable).
#[derive(Debug, Clone)]
pub struct SparseIncidence {
    row_ptr: Vec<usize>,
    row_col: Vec<usize>,
    row_val: Vec<usize>,

    col_ptr: Vec<usize>,
    col_row: Vec<usize>,
    col_val: Vec<usize>,

    m: usize,
    n: usize,
}

impl SparseIncidence {
    /// Build the incidence of `csts` over `n` variables.
    pub fn new(csts: &[MergedConstraint], n: usize) -> Self {
        let m = csts.len();

        let mut tri = TriMat::new((m, n));
        let mut id = 0usize;
        for (k, cst) in csts.iter().enumerate() {
            for e in &cst.elements {
                tri.add_triplet(k, e.var, id);
                id += 1;
            }
        }

        let by_row: sprs::CsMatI<usize, usize> = tri.to_csr();
        let by_col: sprs::CsMatI<usize, usize> = tri.to_csc();

        let (row_ptr, row_col, row_val) = copy_storage(&by_row);
        let (col_ptr, col_row, col_val) = copy_storage(&by_col);

        debug_assert!(row_val
            .iter()
            .enumerate()
            .all(|(position, &value)| position == value));

        Self {
            row_ptr,
            row_col,
            row_val,
            col_ptr,
            col_row,
            col_val,
            m,
            n,
        }
    }

    /// Number of nonzeros; the length of the `A` and `P` arrays.
    pub fn len(&self) -> usize {
        self.row_val.len()
    }

    /// True when the incidence is empty.
    pub fn is_empty(&self) -> bool {
        self.row_val.is_empty()
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.m
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.n
    }

    /// Row view: parallel `(columns, ids)` slices of row `k`.
    #[inline]
    pub fn row(&self, k: usize) -> (&[usize], &[usize]) {
        let span = self.row_ptr[k]..self.row_ptr[k + 1];
        (&self.row_col[span.clone()], &self.row_val[span])
    }

    /// Column view: parallel `(rows, ids)` slices of column `j`, in
    /// ascending row order.
    #[inline]
    pub fn column(&self, j: usize) -> (&[usize], &[usize]) {
        let span = self.col_ptr[j]..self.col_ptr[j + 1];
        (&self.col_row[span.clone()], &self.col_val[span])
    }

    /// Number of entries in row `k`.
    #[inline]
    pub fn row_len(&self, k: usize) -> usize {
        self.row_ptr[k + 1] - self.row_ptr[k]
    }

    /// Largest row length; sizes the reduced-cost scratch.
    pub fn max_row_len(&self) -> usize {
        (0..self.m).map(|k| self.row_len(k)).max().unwrap_or(0)
    }
}

fn copy_storage(mat: &sprs::CsMatI<usize, usize>) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    let mut ptr = Vec::with_capacity(mat.outer_dims() + 1);
    let mut idx = Vec::with_capacity(mat.nnz());
    let mut val = Vec::with_capacity(mat.nnz());

    ptr.push(0);
    for outer in mat.outer_iterator() {
        for (inner, &v) in outer.iter() {
            idx.push(inner);
            val.push(v);
        }
        ptr.push(idx.len());
    }

    (ptr, idx, val)
}
