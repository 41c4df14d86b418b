//! faer adapters for results of compiled functions.
//!
//! Thin conversions accepting `faer::Col<f64>` and returning `faer::Col<f64>` / `faer::Mat<f64>`.

use faer::{Col, Mat};

use crate::error::Result;
use crate::function::CompiledFunction;
use crate::matrix::SparseMatrix;

/// Dense copy of a sparse Jacobian or Hessian.
pub fn to_faer(m: &SparseMatrix<f64>) -> Mat<f64> {
    let dense = m.to_dense();
    Mat::from_fn(m.nrow(), m.ncol(), |i, j| dense[i][j])
}

fn to_args(inputs: &[Col<f64>]) -> Vec<Vec<f64>> {
    inputs
        .iter()
        .map(|x| (0..x.nrows()).map(|i| x[i]).collect())
        .collect()
}

/// Evaluate `f` on `Col` inputs (one per declared input, nonzeros only).
pub fn call_faer(f: &CompiledFunction<f64>, inputs: &[Col<f64>]) -> Result<Vec<Col<f64>>> {
    let out = f.call(&to_args(inputs))?;
    Ok(out
        .into_iter()
        .map(|v| Col::from_fn(v.len(), |i| v[i]))
        .collect())
}

/// Sparse Jacobian of output `oind` w.r.t. input `iind`, densified.
pub fn jacobian_faer(
    f: &CompiledFunction<f64>,
    inputs: &[Col<f64>],
    oind: usize,
    iind: usize,
) -> Result<Mat<f64>> {
    let n = f.config().max_directions;
    let mut mem = f.memory(n, n);
    Ok(to_faer(&f.jacobian(&mut mem, &to_args(inputs), oind, iind)?))
}

/// Sparse Hessian of scalar output `oind` w.r.t. input `iind`, densified.
pub fn hessian_faer(
    f: &CompiledFunction<f64>,
    inputs: &[Col<f64>],
    oind: usize,
    iind: usize,
) -> Result<Mat<f64>> {
    let mut mem = f.memory(f.config().max_directions, 1);
    Ok(to_faer(&f.hessian(&mut mem, &to_args(inputs), oind, iind)?))
}
