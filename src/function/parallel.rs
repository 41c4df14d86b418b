use std::sync::Arc;

use rayon::prelude::*;

use crate::error::Result;
use crate::float::Float;
use crate::matrix::SparseMatrix;

use super::sparse::{batches, HessianPlan, JacobianPlan};

/// One colored sweep batch of a Jacobian.
#[derive(Clone, Debug)]
enum Task {
    Forward(std::ops::Range<usize>),
    Adjoint(std::ops::Range<usize>),
}

impl<F: Float> super::CompiledFunction<F> {
    /// Parallel sparse Jacobian: colored sweep batches run on the rayon pool.
    ///
    /// Each batch allocates its own [`Memory`](super::Memory) and writes a
    /// disjoint set of entries, so the partial results are summed exactly.
    pub fn jacobian_par(&self, inputs: &[Vec<F>], plan: &JacobianPlan) -> Result<SparseMatrix<F>> {
        const OP: &str = "jacobian_par";
        self.check_jacobian_plan(OP, plan)?;
        self.check_inputs(OP, inputs)?;

        let batch = self.config.max_directions;
        let tasks: Vec<Task> = batches(plan.partition.nfwd(), batch)
            .into_iter()
            .map(Task::Forward)
            .chain(batches(plan.partition.nadj(), batch).into_iter().map(Task::Adjoint))
            .collect();
        let nnz = plan.sparsity.nnz();

        let parts: Vec<Vec<F>> = tasks
            .par_iter()
            .map(|task| {
                let mut out = vec![F::zero(); nnz];
                match task {
                    Task::Forward(range) => {
                        let mut mem = self.memory(range.len(), 0);
                        self.jacobian_fwd_batch(&mut mem, inputs, plan, range.clone(), &mut out)?;
                    }
                    Task::Adjoint(range) => {
                        let mut mem = self.memory(0, range.len());
                        self.load_values_full(&mut mem, inputs, OP)?;
                        self.jacobian_adj_batch(&mut mem, plan, range.clone(), &mut out)?;
                    }
                }
                Ok(out)
            })
            .collect::<Result<_>>()?;

        SparseMatrix::new(Arc::clone(&plan.sparsity), sum_parts(parts, nnz))
    }

    /// Parallel sparse Hessian, one task per batch of colors.
    pub fn hessian_par(&self, inputs: &[Vec<F>], plan: &HessianPlan) -> Result<SparseMatrix<F>> {
        const OP: &str = "hessian_par";
        self.check_hessian_plan(OP, plan)?;
        self.check_inputs(OP, inputs)?;

        let nnz = plan.sparsity.nnz();
        let parts: Vec<Vec<F>> = batches(plan.coloring.ncolors(), self.config.max_directions)
            .into_par_iter()
            .map(|range| {
                let mut out = vec![F::zero(); nnz];
                let mut mem = self.memory(range.len(), 1);
                self.hessian_batch(&mut mem, inputs, plan, range, &mut out)?;
                Ok(out)
            })
            .collect::<Result<_>>()?;

        SparseMatrix::new(Arc::clone(&plan.sparsity), sum_parts(parts, nnz))
    }
}

fn sum_parts<F: Float>(parts: Vec<Vec<F>>, nnz: usize) -> Vec<F> {
    let mut values = vec![F::zero(); nnz];
    for part in parts {
        for (v, p) in values.iter_mut().zip(part) {
            *v = *v + p;
        }
    }
    values
}
