//! Compiled functions: a topologically ordered tape over an expression graph.
//!
//! [`compile`] sorts the cone of the requested outputs once. The resulting
//! [`CompiledFunction`] is read-only; every sweep runs against a
//! caller-owned [`Memory`], so one function can be evaluated from many
//! threads at once.
//!
//! # Layouts
//!
//! Every element owns one slot per output nonzero. The full layout gives each
//! element its own slots and is used whenever adjoints are propagated. The
//! compact layout reuses slots once their last consumer has run and is used
//! for value and forward evaluation when
//! [`CompileConfig::reuse_work`] is set.

use std::fmt;
use std::sync::Arc;

use crate::config::CompileConfig;
use crate::error::{Error, Result};
use crate::float::Float;
use crate::graph::ExprGraph;
use crate::node::{GatherKind, NodeId};
use crate::opcode::{BinaryOp, UnaryOp};
use crate::sparsity::{Sparsity, NONE};

// Submodules, each adds impl blocks to CompiledFunction<F>
mod compile;
mod evaluate;
mod export;
mod forward;
mod memory;
mod nonsmooth;
mod reverse;
mod sparse;
mod tangent;

#[cfg(feature = "parallel")]
mod parallel;

pub use self::compile::{compile, compile_with};
pub use self::evaluate::Evaluation;
pub use self::export::ExportTarget;
pub use self::memory::{Memory, MemorySizes};
pub use self::sparse::{HessianPlan, JacobianPlan};

/// How an operand nonzero is found for output nonzero `k`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Access {
    /// Same sparsity as the output: nonzero `k`.
    Same,
    /// Nonzero `map[k]`, or a structural zero where `map[k] == NONE`.
    Mapped(Vec<u32>),
    /// Dense 1x1 operand broadcast to every output nonzero.
    Scalar,
    /// 1x1 operand without a stored nonzero: reads as zero everywhere.
    Zero,
}

impl Access {
    /// Work slot of the operand nonzero feeding output nonzero `k`.
    #[inline]
    pub(crate) fn slot(&self, offset: usize, k: usize) -> Option<usize> {
        match self {
            Access::Same => Some(offset + k),
            Access::Mapped(map) => match map[k] {
                NONE => None,
                j => Some(offset + j as usize),
            },
            Access::Scalar => Some(offset),
            Access::Zero => None,
        }
    }
}

/// Per-element instruction.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Instr<F> {
    /// Declared input number `0`.
    Input(usize),
    Constant(Vec<F>),
    Unary { op: UnaryOp, a: Access },
    /// Elementwise or broadcast binary operation.
    Binary { op: BinaryOp, a: Access, b: Access },
    /// Operands `[c, a]`; `cond` is `Scalar` or `Zero`.
    IfElse { tol: F, cond: Access },
    /// `(operand, nonzero)` per output nonzero.
    Gather { kind: GatherKind, map: Vec<(u32, u32)> },
}

/// One tape entry: an instruction over earlier elements.
#[derive(Clone, Debug)]
pub(crate) struct Element<F> {
    pub(crate) node: NodeId,
    pub(crate) instr: Instr<F>,
    /// Element positions of the operands, in operand order.
    pub(crate) args: Vec<usize>,
    pub(crate) nnz: usize,
}

/// Slot offset of every element in a flat work array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Layout {
    pub(crate) offsets: Vec<usize>,
    pub(crate) size: usize,
}

impl Layout {
    #[inline]
    pub(crate) fn offset(&self, element: usize) -> usize {
        self.offsets[element]
    }
}

/// A compiled expression graph.
///
/// Created by [`compile`]. Immutable and `Send + Sync`.
#[derive(Clone, Debug)]
pub struct CompiledFunction<F: Float> {
    pub(crate) graph: Arc<ExprGraph<F>>,
    pub(crate) elements: Vec<Element<F>>,
    /// Element position of each declared input.
    pub(crate) inputs: Vec<usize>,
    /// Element position of each output.
    pub(crate) outputs: Vec<usize>,
    pub(crate) input_sparsity: Vec<Arc<Sparsity>>,
    pub(crate) output_sparsity: Vec<Arc<Sparsity>>,
    pub(crate) full: Layout,
    pub(crate) compact: Layout,
    pub(crate) config: CompileConfig,
}

impl<F: Float> CompiledFunction<F> {
    /// Number of declared inputs.
    #[inline]
    pub fn n_in(&self) -> usize {
        self.inputs.len()
    }

    /// Number of outputs.
    #[inline]
    pub fn n_out(&self) -> usize {
        self.outputs.len()
    }

    /// Sparsity of input `i`.
    pub fn input_sparsity(&self, i: usize) -> Result<&Arc<Sparsity>> {
        self.input_sparsity
            .get(i)
            .ok_or_else(|| Error::out_of_range("input_sparsity", "input", i, self.n_in()))
    }

    /// Sparsity of output `o`.
    pub fn output_sparsity(&self, o: usize) -> Result<&Arc<Sparsity>> {
        self.output_sparsity
            .get(o)
            .ok_or_else(|| Error::out_of_range("output_sparsity", "output", o, self.n_out()))
    }

    /// Number of tape elements, inputs included.
    #[inline]
    pub fn n_elements(&self) -> usize {
        self.elements.len()
    }

    /// Work slots of the full layout.
    #[inline]
    pub fn full_size(&self) -> usize {
        self.full.size
    }

    /// Work slots of the compact layout.
    #[inline]
    pub fn compact_size(&self) -> usize {
        self.compact.size
    }

    /// The graph this function was compiled from.
    pub fn graph(&self) -> &Arc<ExprGraph<F>> {
        &self.graph
    }

    pub fn config(&self) -> &CompileConfig {
        &self.config
    }

    /// False if any element on the tape has a kink or a jump.
    pub fn is_smooth(&self) -> bool {
        self.elements.iter().all(|el| match &el.instr {
            Instr::Unary { op, .. } => !op.is_nonsmooth(),
            Instr::Binary { op, .. } => !op.is_nonsmooth(),
            Instr::IfElse { .. } => false,
            _ => true,
        })
    }

    /// Layout used for a sweep with `nadj` adjoint directions.
    #[inline]
    pub(crate) fn layout(&self, nadj: usize) -> &Layout {
        if nadj == 0 && self.config.reuse_work {
            &self.compact
        } else {
            &self.full
        }
    }

    pub(crate) fn check_input_index(&self, op: &'static str, i: usize) -> Result<()> {
        if i < self.n_in() {
            Ok(())
        } else {
            Err(Error::out_of_range(op, "input", i, self.n_in()))
        }
    }

    pub(crate) fn check_output_index(&self, op: &'static str, o: usize) -> Result<()> {
        if o < self.n_out() {
            Ok(())
        } else {
            Err(Error::out_of_range(op, "output", o, self.n_out()))
        }
    }

    /// Check input values against the input sparsities.
    pub(crate) fn check_inputs(&self, op: &'static str, inputs: &[Vec<F>]) -> Result<()> {
        if inputs.len() != self.n_in() {
            return Err(Error::mismatch(op, "inputs", self.n_in(), inputs.len()));
        }
        for (i, (x, sp)) in inputs.iter().zip(&self.input_sparsity).enumerate() {
            if x.len() != sp.nnz() {
                return Err(Error::mismatch(op, format!("nonzeros of input {i}"), sp.nnz(), x.len()));
            }
        }
        Ok(())
    }

    /// Write input values into the value array.
    pub(crate) fn load_inputs(&self, values: &mut [F], layout: &Layout, inputs: &[Vec<F>]) {
        for (&pos, x) in self.inputs.iter().zip(inputs) {
            let o = layout.offset(pos);
            values[o..o + x.len()].copy_from_slice(x);
        }
    }

    /// Raise `Error::Numeric` if `v` is not finite and checking is on.
    #[inline]
    pub(crate) fn check_finite(&self, op: &'static str, element: usize, nz: usize, v: F) -> Result<()> {
        if self.config.check_finite && !v.is_finite() {
            return Err(Error::Numeric {
                op,
                node: self.elements[element].node,
                nz,
            });
        }
        Ok(())
    }
}

/// `d * t`, or zero when the seed `t` is zero. Keeps an infinite partial
/// from turning an inactive direction into NaN.
#[inline]
pub(crate) fn mul_seed<F: Float>(d: F, t: F) -> F {
    if t == F::zero() {
        F::zero()
    } else {
        d * t
    }
}

impl<F: Float> fmt::Display for CompiledFunction<F> {
    /// One line per element, e.g. `@3 = sin(@1)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |pos: usize| self.elements[pos].node;
        for el in &self.elements {
            write!(f, "{} = ", el.node)?;
            match &el.instr {
                Instr::Input(i) => write!(f, "input[{i}]")?,
                Instr::Constant(values) => {
                    let sp = &self.graph.nodes()[el.node.index()].sparsity;
                    if values.len() == 1 {
                        write!(f, "{}", values[0])?;
                    } else {
                        write!(f, "const({sp})")?;
                    }
                }
                Instr::Unary { op, .. } => write!(f, "{}({})", op, name(el.args[0]))?,
                Instr::Binary { op, .. } => {
                    let (a, b) = (name(el.args[0]), name(el.args[1]));
                    match op.symbol() {
                        Some(s) => write!(f, "({a}{s}{b})")?,
                        None => write!(f, "{op}({a}, {b})")?,
                    }
                }
                Instr::IfElse { tol, .. } => write!(
                    f,
                    "if_else({}, {}, tol={})",
                    name(el.args[0]),
                    name(el.args[1]),
                    tol
                )?,
                Instr::Gather { kind, .. } => {
                    write!(f, "{}(", kind.name())?;
                    for (j, &a) in el.args.iter().enumerate() {
                        if j > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}", name(a))?;
                    }
                    f.write_str(")")?;
                }
            }
            writeln!(f)?;
        }
        for (o, &pos) in self.outputs.iter().enumerate() {
            writeln!(f, "output[{o}] = {}", name(pos))?;
        }
        Ok(())
    }
}
