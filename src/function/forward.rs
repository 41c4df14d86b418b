use crate::error::Result;
use crate::float::Float;

use super::memory::Memory;
use super::{mul_seed, Instr, Layout};

impl<F: Float> super::CompiledFunction<F> {
    /// Value sweep carrying `nfwd` tangent directions in the same pass.
    ///
    /// Input values and input tangents must already be loaded at the input
    /// slots of `layout`. Every other slot is overwritten before it is read.
    pub(crate) fn sweep_forward(
        &self,
        mem: &mut Memory<F>,
        layout: &Layout,
        nfwd: usize,
        op: &'static str,
    ) -> Result<()> {
        let values = &mut mem.values;
        let fwd = &mut mem.fwd[..nfwd];
        let zero = F::zero();

        for (i, el) in self.elements.iter().enumerate() {
            let o = layout.offset(i);
            let n = el.nnz;
            let arg = |j: usize| layout.offset(el.args[j]);

            match &el.instr {
                Instr::Input(_) => {}
                Instr::Constant(v) => {
                    values[o..o + n].copy_from_slice(v);
                    for t in fwd.iter_mut() {
                        t[o..o + n].fill(zero);
                    }
                }
                Instr::Unary { op: u, a } => {
                    let oa = arg(0);
                    for k in 0..n {
                        let sa = a.slot(oa, k);
                        let x = sa.map_or(zero, |s| values[s]);
                        let r = u.eval(x);
                        values[o + k] = r;
                        if nfwd > 0 {
                            let d = u.partial(x, r);
                            for t in fwd.iter_mut() {
                                t[o + k] = sa.map_or(zero, |s| mul_seed(d, t[s]));
                            }
                        }
                    }
                }
                Instr::Binary { op: b_op, a, b } => {
                    let (oa, ob) = (arg(0), arg(1));
                    for k in 0..n {
                        let sa = a.slot(oa, k);
                        let sb = b.slot(ob, k);
                        let x = sa.map_or(zero, |s| values[s]);
                        let y = sb.map_or(zero, |s| values[s]);
                        let r = b_op.eval(x, y);
                        values[o + k] = r;
                        if nfwd > 0 {
                            let (da, db) = b_op.partials(x, y, r);
                            for t in fwd.iter_mut() {
                                let ta = sa.map_or(zero, |s| mul_seed(da, t[s]));
                                let tb = sb.map_or(zero, |s| mul_seed(db, t[s]));
                                t[o + k] = ta + tb;
                            }
                        }
                    }
                }
                Instr::IfElse { tol, cond } => {
                    let oa = arg(1);
                    let c = cond.slot(arg(0), 0).map_or(zero, |s| values[s]);
                    let selected = c.abs() < *tol;
                    for k in 0..n {
                        values[o + k] = if selected { values[oa + k] } else { zero };
                    }
                    for t in fwd.iter_mut() {
                        for k in 0..n {
                            t[o + k] = if selected { t[oa + k] } else { zero };
                        }
                    }
                }
                Instr::Gather { map, .. } => {
                    for (k, &(d, nz)) in map.iter().enumerate() {
                        let s = arg(d as usize) + nz as usize;
                        values[o + k] = values[s];
                        for t in fwd.iter_mut() {
                            t[o + k] = t[s];
                        }
                    }
                }
            }

            if self.config.check_finite {
                for k in 0..n {
                    self.check_finite(op, i, k, values[o + k])?;
                    for t in fwd.iter() {
                        self.check_finite(op, i, k, t[o + k])?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Write tangent `d` of every input: `seed(i, k)` at nonzero `k` of input `i`.
    pub(crate) fn load_tangents(
        &self,
        mem: &mut Memory<F>,
        layout: &Layout,
        d: usize,
        seed: impl Fn(usize, usize) -> F,
    ) {
        let t = &mut mem.fwd[d];
        for (i, (&pos, sp)) in self.inputs.iter().zip(&self.input_sparsity).enumerate() {
            let o = layout.offset(pos);
            for k in 0..sp.nnz() {
                t[o + k] = seed(i, k);
            }
        }
    }
}
