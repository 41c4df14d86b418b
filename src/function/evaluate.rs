use log::trace;

use crate::error::{Error, Result};
use crate::float::Float;

use super::memory::{Memory, MemorySizes};

const OP: &str = "evaluate";

/// Result of [`CompiledFunction::evaluate`](super::CompiledFunction::evaluate).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Evaluation<F> {
    /// Output nonzeros, one vector per output.
    pub outputs: Vec<Vec<F>>,
    /// Forward sensitivities, indexed `[direction][output]`.
    pub fwd_sens: Vec<Vec<Vec<F>>>,
    /// Adjoint sensitivities, indexed `[direction][input]`.
    pub adj_sens: Vec<Vec<Vec<F>>>,
}

impl<F: Float> super::CompiledFunction<F> {
    /// Evaluate outputs together with forward and adjoint sensitivities.
    ///
    /// `fwd_seeds[d][i]` is the tangent of input `i` in direction `d`, and
    /// `adj_seeds[d][o]` the adjoint seed of output `o`; both are given on
    /// the nonzeros of the respective sparsity. `mem` must have been sized by
    /// [`required_memory`](Self::required_memory) for at least as many
    /// directions as are seeded.
    ///
    /// Forward sensitivities are `J ẋ`, adjoint sensitivities `Jᵀ λ`, both
    /// restricted to the structural nonzeros.
    pub fn evaluate(
        &self,
        mem: &mut Memory<F>,
        inputs: &[Vec<F>],
        fwd_seeds: &[Vec<Vec<F>>],
        adj_seeds: &[Vec<Vec<F>>],
    ) -> Result<Evaluation<F>> {
        self.check_inputs(OP, inputs)?;
        let (nfwd, nadj) = (fwd_seeds.len(), adj_seeds.len());
        for (d, seed) in fwd_seeds.iter().enumerate() {
            self.check_seed(seed, &self.input_sparsity, "input", d, "forward")?;
        }
        for (d, seed) in adj_seeds.iter().enumerate() {
            self.check_seed(seed, &self.output_sparsity, "output", d, "adjoint")?;
        }
        mem.check(
            OP,
            MemorySizes {
                work: self.layout(nadj).size,
                nfwd,
                nadj,
            },
        )?;
        trace!("evaluate: {nfwd} forward, {nadj} adjoint direction(s)");

        let layout = self.layout(nadj);
        self.load_inputs(&mut mem.values, layout, inputs);
        for (d, seed) in fwd_seeds.iter().enumerate() {
            self.load_tangents(mem, layout, d, |i, k| seed[i][k]);
        }
        self.sweep_forward(mem, layout, nfwd, OP)?;

        let read = |w: &[F], o: usize| {
            let off = layout.offset(self.outputs[o]);
            w[off..off + self.output_sparsity[o].nnz()].to_vec()
        };
        let outputs = (0..self.n_out()).map(|o| read(&mem.values, o)).collect();
        let fwd_sens = mem.fwd[..nfwd]
            .iter()
            .map(|t| (0..self.n_out()).map(|o| read(t, o)).collect())
            .collect();

        let mut adj_sens = Vec::with_capacity(nadj);
        if nadj > 0 {
            for (d, seed) in adj_seeds.iter().enumerate() {
                Self::clear_adjoint(mem, d);
                for (o, s) in seed.iter().enumerate() {
                    self.seed_adjoint(mem, d, o, |k| s[k]);
                }
            }
            self.sweep_adjoint(mem, nadj, OP)?;
            for d in 0..nadj {
                adj_sens.push((0..self.n_in()).map(|i| self.take_input_adjoint(mem, d, i)).collect());
            }
        }

        Ok(Evaluation {
            outputs,
            fwd_sens,
            adj_sens,
        })
    }

    /// Evaluate outputs only, allocating a fresh [`Memory`].
    pub fn call(&self, inputs: &[Vec<F>]) -> Result<Vec<Vec<F>>> {
        let mut mem = self.memory(0, 0);
        Ok(self.evaluate(&mut mem, inputs, &[], &[])?.outputs)
    }

    fn check_seed(
        &self,
        seed: &[Vec<F>],
        sparsity: &[std::sync::Arc<crate::sparsity::Sparsity>],
        what: &str,
        d: usize,
        dir: &str,
    ) -> Result<()> {
        if seed.len() != sparsity.len() {
            return Err(Error::mismatch(
                OP,
                format!("{dir} seed {d}: {what}s"),
                sparsity.len(),
                seed.len(),
            ));
        }
        for (j, (s, sp)) in seed.iter().zip(sparsity).enumerate() {
            if s.len() != sp.nnz() {
                return Err(Error::mismatch(
                    OP,
                    format!("{dir} seed {d}: nonzeros of {what} {j}"),
                    sp.nnz(),
                    s.len(),
                ));
            }
        }
        Ok(())
    }
}
