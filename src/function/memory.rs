use crate::error::{DimensionError, Error, Result};
use crate::float::Float;

use super::CompiledFunction;

/// Buffer sizes needed for a sweep with `nfwd` forward and `nadj` adjoint
/// directions. Returned by [`CompiledFunction::required_memory`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MemorySizes {
    /// Slots per work array.
    pub work: usize,
    /// Forward (tangent) arrays.
    pub nfwd: usize,
    /// Adjoint arrays.
    pub nadj: usize,
}

impl MemorySizes {
    /// Second-order adjoint arrays, one per forward direction when adjoints
    /// are requested.
    pub fn n_second_order(&self) -> usize {
        if self.nadj > 0 {
            self.nfwd
        } else {
            0
        }
    }

    /// Total number of scalars allocated by [`Memory::new`].
    pub fn total(&self) -> usize {
        self.work * (1 + self.nfwd + self.nadj + self.n_second_order())
    }
}

/// Caller-owned work buffers for one evaluation at a time.
///
/// All mutable evaluation state lives here; a [`CompiledFunction`] is never
/// written to. Give each thread its own `Memory`.
#[derive(Clone, Debug)]
pub struct Memory<F> {
    sizes: MemorySizes,
    pub(crate) values: Vec<F>,
    pub(crate) fwd: Vec<Vec<F>>,
    pub(crate) adj: Vec<Vec<F>>,
    /// Tangents of the adjoints, for forward-over-adjoint sweeps.
    pub(crate) adj_fwd: Vec<Vec<F>>,
}

impl<F: Float> Memory<F> {
    /// Allocate zeroed buffers.
    pub fn new(sizes: MemorySizes) -> Self {
        let w = sizes.work;
        Memory {
            sizes,
            values: vec![F::zero(); w],
            fwd: vec![vec![F::zero(); w]; sizes.nfwd],
            adj: vec![vec![F::zero(); w]; sizes.nadj],
            adj_fwd: vec![vec![F::zero(); w]; sizes.n_second_order()],
        }
    }

    pub fn sizes(&self) -> MemorySizes {
        self.sizes
    }

    /// Forward directions this block can hold.
    pub fn nfwd(&self) -> usize {
        self.sizes.nfwd
    }

    /// Adjoint directions this block can hold.
    pub fn nadj(&self) -> usize {
        self.sizes.nadj
    }

    /// Fail unless the block holds `needed`.
    pub(crate) fn check(&self, op: &'static str, needed: MemorySizes) -> Result<()> {
        let have = self.sizes;
        let short = |what, needed, available| {
            Err(Error::dimension(
                op,
                DimensionError::Memory {
                    what,
                    needed,
                    available,
                },
            ))
        };
        if have.work < needed.work {
            return short("work slots", needed.work, have.work);
        }
        if have.nfwd < needed.nfwd {
            return short("forward directions", needed.nfwd, have.nfwd);
        }
        if have.nadj < needed.nadj {
            return short("adjoint directions", needed.nadj, have.nadj);
        }
        if have.n_second_order() < needed.n_second_order() {
            return short("second-order directions", needed.n_second_order(), have.n_second_order());
        }
        Ok(())
    }
}

impl<F: Float> CompiledFunction<F> {
    /// Buffer sizes for `nfwd` forward and `nadj` adjoint directions.
    ///
    /// Without adjoints the compact layout is used when
    /// [`reuse_work`](crate::CompileConfig::reuse_work) is set.
    pub fn required_memory(&self, nfwd: usize, nadj: usize) -> MemorySizes {
        MemorySizes {
            work: self.layout(nadj).size,
            nfwd,
            nadj,
        }
    }

    /// Allocate a [`Memory`] for `nfwd` forward and `nadj` adjoint directions.
    pub fn memory(&self, nfwd: usize, nadj: usize) -> Memory<F> {
        Memory::new(self.required_memory(nfwd, nadj))
    }
}
