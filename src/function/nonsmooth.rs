use crate::error::Result;
use crate::float::Float;
use crate::nonsmooth::{binary_kink, unary_kink, KinkEntry, KinkOp, NonsmoothInfo};

use super::memory::{Memory, MemorySizes};
use super::Instr;

const OP: &str = "nonsmooth";

impl<F: Float> super::CompiledFunction<F> {
    /// Evaluate at `inputs` and record every kink on the tape.
    ///
    /// Returns one [`KinkEntry`] per nonzero of every `abs`, `sign`, `floor`,
    /// `ceil`, `min`, `max` and `if_else` element, in tape order. Smooth
    /// functions give an empty list.
    pub fn nonsmooth(&self, inputs: &[Vec<F>]) -> Result<NonsmoothInfo<F>> {
        self.check_inputs(OP, inputs)?;
        let mut mem = Memory::new(MemorySizes {
            work: self.full.size,
            nfwd: 0,
            nadj: 0,
        });
        let layout = &self.full;
        self.load_inputs(&mut mem.values, layout, inputs);
        self.sweep_forward(&mut mem, layout, 0, OP)?;
        let values = &mem.values;

        let mut kinks = Vec::new();
        for el in &self.elements {
            let arg = |j: usize| layout.offset(el.args[j]);
            let mut push = |nz: usize, op: KinkOp, (switching_value, branch): (F, i8)| {
                kinks.push(KinkEntry {
                    node: el.node,
                    nz,
                    op,
                    switching_value,
                    branch,
                });
            };
            match &el.instr {
                Instr::Unary { op, a } if op.is_nonsmooth() => {
                    for k in 0..el.nnz {
                        let x = a.slot(arg(0), k).map_or(F::zero(), |s| values[s]);
                        push(k, KinkOp::Unary(*op), unary_kink(*op, x));
                    }
                }
                Instr::Binary { op, a, b } if op.is_nonsmooth() => {
                    for k in 0..el.nnz {
                        let x = a.slot(arg(0), k).map_or(F::zero(), |s| values[s]);
                        let y = b.slot(arg(1), k).map_or(F::zero(), |s| values[s]);
                        push(k, KinkOp::Binary(*op), binary_kink(*op, x, y));
                    }
                }
                Instr::IfElse { tol, cond } => {
                    let c = cond.slot(arg(0), 0).map_or(F::zero(), |s| values[s]).abs();
                    let branch = if c < *tol { 1 } else { -1 };
                    for k in 0..el.nnz {
                        push(k, KinkOp::IfElse, (c - *tol, branch));
                    }
                }
                _ => {}
            }
        }
        Ok(NonsmoothInfo { kinks })
    }
}
