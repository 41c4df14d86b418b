//! nalgebra adapters for results of compiled functions.
//!
//! Thin conversions from [`SparseMatrix`] and nonzero vectors to `DMatrix` /
//! `DVector`.

use nalgebra::{DMatrix, DVector};

use crate::error::Result;
use crate::float::Float;
use crate::function::CompiledFunction;
use crate::matrix::SparseMatrix;

/// Dense copy of a sparse Jacobian or Hessian.
pub fn to_dmatrix<F: Float + nalgebra::Scalar>(m: &SparseMatrix<F>) -> DMatrix<F> {
    let mut dense = DMatrix::from_element(m.nrow(), m.ncol(), F::zero());
    for (r, c, v) in m.triplets() {
        dense[(r, c)] = v;
    }
    dense
}

/// Evaluate `f` on `DVector` inputs (one per declared input, nonzeros only).
pub fn call_nalgebra<F: Float + nalgebra::Scalar>(
    f: &CompiledFunction<F>,
    inputs: &[DVector<F>],
) -> Result<Vec<DVector<F>>> {
    let args: Vec<Vec<F>> = inputs.iter().map(|x| x.as_slice().to_vec()).collect();
    Ok(f.call(&args)?.into_iter().map(DVector::from_vec).collect())
}

/// Sparse Jacobian of output `oind` w.r.t. input `iind`, densified.
pub fn jacobian_nalgebra<F: Float + nalgebra::Scalar>(
    f: &CompiledFunction<F>,
    inputs: &[DVector<F>],
    oind: usize,
    iind: usize,
) -> Result<DMatrix<F>> {
    let args: Vec<Vec<F>> = inputs.iter().map(|x| x.as_slice().to_vec()).collect();
    let n = f.config().max_directions;
    let mut mem = f.memory(n, n);
    Ok(to_dmatrix(&f.jacobian(&mut mem, &args, oind, iind)?))
}

/// Sparse Hessian of scalar output `oind` w.r.t. input `iind`, densified.
pub fn hessian_nalgebra<F: Float + nalgebra::Scalar>(
    f: &CompiledFunction<F>,
    inputs: &[DVector<F>],
    oind: usize,
    iind: usize,
) -> Result<DMatrix<F>> {
    let args: Vec<Vec<F>> = inputs.iter().map(|x| x.as_slice().to_vec()).collect();
    let mut mem = f.memory(f.config().max_directions, 1);
    Ok(to_dmatrix(&f.hessian(&mut mem, &args, oind, iind)?))
}
