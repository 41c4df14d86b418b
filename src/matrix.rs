use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::float::Float;
use crate::sparsity::Sparsity;

/// Numeric values on a sparsity pattern, one per structural nonzero.
///
/// Returned by [`CompiledFunction::jacobian`](crate::CompiledFunction::jacobian)
/// and [`CompiledFunction::hessian`](crate::CompiledFunction::hessian).
#[derive(Clone, Debug, PartialEq)]
pub struct SparseMatrix<F> {
    sparsity: Arc<Sparsity>,
    values: Vec<F>,
}

impl<F: Float> SparseMatrix<F> {
    /// Pair a pattern with its nonzero values.
    pub fn new(sparsity: Arc<Sparsity>, values: Vec<F>) -> Result<Self> {
        if values.len() != sparsity.nnz() {
            return Err(Error::mismatch("SparseMatrix::new", "values", sparsity.nnz(), values.len()));
        }
        Ok(SparseMatrix { sparsity, values })
    }

    pub(crate) fn zeros(sparsity: Arc<Sparsity>) -> Self {
        let values = vec![F::zero(); sparsity.nnz()];
        SparseMatrix { sparsity, values }
    }

    pub fn sparsity(&self) -> &Arc<Sparsity> {
        &self.sparsity
    }

    /// Nonzero values in row-major order.
    pub fn values(&self) -> &[F] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [F] {
        &mut self.values
    }

    pub fn nrow(&self) -> usize {
        self.sparsity.nrow()
    }

    pub fn ncol(&self) -> usize {
        self.sparsity.ncol()
    }

    pub fn nnz(&self) -> usize {
        self.sparsity.nnz()
    }

    /// Entry `(r, c)`; zero where the pattern has no nonzero.
    ///
    /// # Panics
    ///
    /// Panics if `(r, c)` lies outside the matrix.
    pub fn get(&self, r: usize, c: usize) -> F {
        assert!(r < self.nrow() && c < self.ncol(), "index ({r}, {c}) out of bounds");
        self.sparsity
            .nz_index(r, c)
            .map_or(F::zero(), |k| self.values[k])
    }

    /// Iterate over `(row, col, value)` of the stored nonzeros.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, F)> + '_ {
        self.sparsity
            .iter()
            .zip(self.values.iter())
            .map(|((r, c), &v)| (r, c, v))
    }

    /// Dense copy, `result[r][c]`.
    pub fn to_dense(&self) -> Vec<Vec<F>> {
        let mut dense = vec![vec![F::zero(); self.ncol()]; self.nrow()];
        for (r, c, v) in self.triplets() {
            dense[r][c] = v;
        }
        dense
    }
}

impl<F: Float> fmt::Display for SparseMatrix<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sparse {} [", self.sparsity)?;
        for (i, (r, c, v)) in self.triplets().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "({r},{c}): {v}")?;
        }
        f.write_str("]")
    }
}
