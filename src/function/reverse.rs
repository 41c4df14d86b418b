use crate::error::Result;
use crate::float::Float;

use super::memory::Memory;
use super::{mul_seed, Instr};

impl<F: Float> super::CompiledFunction<F> {
    /// Adjoint sweep over the full layout for `nadj` directions.
    ///
    /// Expects values from a forward sweep over the full layout and seeded
    /// adjoint arrays. Each element adds its contributions into its operands
    /// and clears its own adjoint; input adjoints are left for the caller.
    pub(crate) fn sweep_adjoint(&self, mem: &mut Memory<F>, nadj: usize, op: &'static str) -> Result<()> {
        let layout = &self.full;
        let values = &mem.values;
        let adj = &mut mem.adj[..nadj];
        let zero = F::zero();
        let mut lam = vec![zero; nadj];

        for (i, el) in self.elements.iter().enumerate().rev() {
            if matches!(el.instr, Instr::Input(_)) {
                continue;
            }
            let o = layout.offset(i);
            let arg = |j: usize| layout.offset(el.args[j]);

            for k in 0..el.nnz {
                let mut active = false;
                for (l, a) in lam.iter_mut().zip(adj.iter_mut()) {
                    *l = a[o + k];
                    a[o + k] = zero;
                    active |= *l != zero;
                }
                if !active {
                    continue;
                }
                for &l in &lam {
                    self.check_finite(op, i, k, l)?;
                }

                match &el.instr {
                    Instr::Input(_) | Instr::Constant(_) => {}
                    Instr::Unary { op: u, a } => {
                        if let Some(s) = a.slot(arg(0), k) {
                            let d = u.partial(values[s], values[o + k]);
                            for (&l, w) in lam.iter().zip(adj.iter_mut()) {
                                w[s] = w[s] + mul_seed(d, l);
                            }
                        }
                    }
                    Instr::Binary { op: b_op, a, b } => {
                        let sa = a.slot(arg(0), k);
                        let sb = b.slot(arg(1), k);
                        let x = sa.map_or(zero, |s| values[s]);
                        let y = sb.map_or(zero, |s| values[s]);
                        let (da, db) = b_op.partials(x, y, values[o + k]);
                        for (&l, w) in lam.iter().zip(adj.iter_mut()) {
                            if let Some(s) = sa {
                                w[s] = w[s] + mul_seed(da, l);
                            }
                            if let Some(s) = sb {
                                w[s] = w[s] + mul_seed(db, l);
                            }
                        }
                    }
                    Instr::IfElse { tol, cond } => {
                        let c = cond.slot(arg(0), 0).map_or(zero, |s| values[s]);
                        if c.abs() < *tol {
                            let s = arg(1) + k;
                            for (&l, w) in lam.iter().zip(adj.iter_mut()) {
                                w[s] = w[s] + l;
                            }
                        }
                    }
                    Instr::Gather { map, .. } => {
                        let (d, nz) = map[k];
                        let s = arg(d as usize) + nz as usize;
                        for (&l, w) in lam.iter().zip(adj.iter_mut()) {
                            w[s] = w[s] + l;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Zero adjoint array `d` before seeding.
    pub(crate) fn clear_adjoint(mem: &mut Memory<F>, d: usize) {
        mem.adj[d].fill(F::zero());
    }

    /// Add `seed(k)` at nonzero `k` of output `o` in adjoint array `d`.
    pub(crate) fn seed_adjoint(&self, mem: &mut Memory<F>, d: usize, o: usize, seed: impl Fn(usize) -> F) {
        let off = self.full.offset(self.outputs[o]);
        let w = &mut mem.adj[d];
        for k in 0..self.output_sparsity[o].nnz() {
            w[off + k] = w[off + k] + seed(k);
        }
    }

    /// Read the adjoint of input `i` from array `d` and clear it.
    pub(crate) fn take_input_adjoint(&self, mem: &mut Memory<F>, d: usize, i: usize) -> Vec<F> {
        let off = self.full.offset(self.inputs[i]);
        let n = self.input_sparsity[i].nnz();
        let w = &mut mem.adj[d][off..off + n];
        let out = w.to_vec();
        w.fill(F::zero());
        out
    }
}
