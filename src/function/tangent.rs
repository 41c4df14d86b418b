//! Forward-over-adjoint sweep for Hessian-vector products.
//!
//! After a forward sweep with tangents `ẋ`, the adjoint `λ` of every value is
//! propagated together with its tangent `λ̇`. For `r = f(a, b)`:
//!
//! ```text
//! λ_a += f_a λ
//! λ̇_a += f_a λ̇ + λ (f_aa ȧ + f_ab ḃ)
//! ```
//!
//! and symmetrically for `b`. Seeding `λ = 1` on a scalar output and `ẋ = v`
//! on the inputs yields `λ̇_x = H v`.

use crate::error::Result;
use crate::float::Float;

use super::memory::Memory;
use super::{mul_seed, Instr};

impl<F: Float> super::CompiledFunction<F> {
    /// Second-order sweep: adjoint array 0 plus `nfwd` adjoint tangents.
    ///
    /// Expects a forward sweep with `nfwd` tangents over the full layout, a
    /// seeded `adj[0]` and zeroed `adj_fwd[..nfwd]`.
    pub(crate) fn sweep_second_order(
        &self,
        mem: &mut Memory<F>,
        nfwd: usize,
        op: &'static str,
    ) -> Result<()> {
        let layout = &self.full;
        let values = &mem.values;
        let fwd = &mem.fwd[..nfwd];
        let lam_w = &mut mem.adj[0];
        let dots = &mut mem.adj_fwd[..nfwd];
        let zero = F::zero();
        let mut ldot = vec![zero; nfwd];

        for (i, el) in self.elements.iter().enumerate().rev() {
            if matches!(el.instr, Instr::Input(_)) {
                continue;
            }
            let o = layout.offset(i);
            let arg = |j: usize| layout.offset(el.args[j]);

            for k in 0..el.nnz {
                let lam = lam_w[o + k];
                lam_w[o + k] = zero;
                let mut active = lam != zero;
                for (ld, w) in ldot.iter_mut().zip(dots.iter_mut()) {
                    *ld = w[o + k];
                    w[o + k] = zero;
                    active |= *ld != zero;
                }
                if !active {
                    continue;
                }
                self.check_finite(op, i, k, lam)?;
                for &ld in &ldot {
                    self.check_finite(op, i, k, ld)?;
                }

                match &el.instr {
                    Instr::Input(_) | Instr::Constant(_) => {}
                    Instr::Unary { op: u, a } => {
                        let Some(s) = a.slot(arg(0), k) else {
                            continue;
                        };
                        let (x, r) = (values[s], values[o + k]);
                        let d1 = u.partial(x, r);
                        lam_w[s] = lam_w[s] + mul_seed(d1, lam);
                        let d2 = if lam != zero { lam * u.second_partial(x, r) } else { zero };
                        for ((w, &ld), t) in dots.iter_mut().zip(&ldot).zip(fwd) {
                            w[s] = w[s] + mul_seed(d1, ld) + mul_seed(d2, t[s]);
                        }
                    }
                    Instr::Binary { op: b_op, a, b } => {
                        let sa = a.slot(arg(0), k);
                        let sb = b.slot(arg(1), k);
                        let x = sa.map_or(zero, |s| values[s]);
                        let y = sb.map_or(zero, |s| values[s]);
                        let r = values[o + k];
                        let (da, db) = b_op.partials(x, y, r);
                        if let Some(s) = sa {
                            lam_w[s] = lam_w[s] + mul_seed(da, lam);
                        }
                        if let Some(s) = sb {
                            lam_w[s] = lam_w[s] + mul_seed(db, lam);
                        }
                        let (haa, hab, hbb) = if lam != zero {
                            let (faa, fab, fbb) = b_op.second_partials(x, y, r);
                            (lam * faa, lam * fab, lam * fbb)
                        } else {
                            (zero, zero, zero)
                        };
                        for ((w, &ld), t) in dots.iter_mut().zip(&ldot).zip(fwd) {
                            let ta = sa.map_or(zero, |s| t[s]);
                            let tb = sb.map_or(zero, |s| t[s]);
                            if let Some(s) = sa {
                                w[s] = w[s] + mul_seed(da, ld) + mul_seed(haa, ta) + mul_seed(hab, tb);
                            }
                            if let Some(s) = sb {
                                w[s] = w[s] + mul_seed(db, ld) + mul_seed(hab, ta) + mul_seed(hbb, tb);
                            }
                        }
                    }
                    Instr::IfElse { tol, cond } => {
                        let c = cond.slot(arg(0), 0).map_or(zero, |s| values[s]);
                        if c.abs() < *tol {
                            let s = arg(1) + k;
                            lam_w[s] = lam_w[s] + lam;
                            for (w, &ld) in dots.iter_mut().zip(&ldot) {
                                w[s] = w[s] + ld;
                            }
                        }
                    }
                    Instr::Gather { map, .. } => {
                        let (d, nz) = map[k];
                        let s = arg(d as usize) + nz as usize;
                        lam_w[s] = lam_w[s] + lam;
                        for (w, &ld) in dots.iter_mut().zip(&ldot) {
                            w[s] = w[s] + ld;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Read the adjoint tangent `d` of input `i` and clear it.
    pub(crate) fn take_input_adjoint_tangent(&self, mem: &mut Memory<F>, d: usize, i: usize) -> Vec<F> {
        let off = self.full.offset(self.inputs[i]);
        let n = self.input_sparsity[i].nnz();
        let w = &mut mem.adj_fwd[d][off..off + n];
        let out = w.to_vec();
        w.fill(F::zero());
        out
    }
}
