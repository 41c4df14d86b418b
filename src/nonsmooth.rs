//! Branch tracking for non-smooth nodes.
//!
//! [`CompiledFunction::nonsmooth`](crate::CompiledFunction::nonsmooth)
//! evaluates a function and records, for every nonzero of every non-smooth
//! element, how far the input is from the switching surface and which side
//! was taken. Derivatives computed at a point with an active kink are one of
//! several one-sided limits.

use std::fmt;

use num_traits::Float;

use crate::node::NodeId;
use crate::opcode::{BinaryOp, UnaryOp};

/// The non-smooth operation behind a kink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KinkOp {
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Conditional select; the switching surface is `|c| = tol`.
    IfElse,
}

impl fmt::Display for KinkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KinkOp::Unary(op) => write!(f, "{op}"),
            KinkOp::Binary(op) => write!(f, "{op}"),
            KinkOp::IfElse => f.write_str("if_else"),
        }
    }
}

/// One kink encountered during evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct KinkEntry<F: Float> {
    /// Node of the non-smooth element.
    pub node: NodeId,
    /// Output nonzero of that node.
    pub nz: usize,
    pub op: KinkOp,
    /// Signed distance from the switching surface:
    /// - `abs`, `sign`: `x`
    /// - `min`, `max`: `a - b`
    /// - `floor`, `ceil`: `x - round(x)`
    /// - `if_else`: `|c| - tol`
    pub switching_value: F,
    /// Which side was taken:
    /// - `abs`, `sign`: `+1` if `x >= 0`
    /// - `max`: `+1` if `a >= b`; `min`: `+1` if `a <= b`
    /// - `floor`, `ceil`: `+1` if below the half-integer
    /// - `if_else`: `+1` if the branch was selected
    pub branch: i8,
}

impl<F: Float> KinkEntry<F> {
    /// True if the input lies within `tol` of the switching surface.
    #[inline]
    pub fn is_active(&self, tol: F) -> bool {
        self.switching_value.abs() < tol
    }
}

/// All kinks of one evaluation.
///
/// One entry per nonzero of every non-smooth element, in tape order. The
/// entry list of a given function has the same length and the same
/// `(node, nz)` sequence at every input; only values and branches change.
#[derive(Clone, Debug, PartialEq)]
pub struct NonsmoothInfo<F: Float> {
    pub kinks: Vec<KinkEntry<F>>,
}

impl<F: Float> NonsmoothInfo<F> {
    /// Kinks whose switching value is within `tol` of zero.
    pub fn active_kinks(&self, tol: F) -> Vec<&KinkEntry<F>> {
        self.kinks.iter().filter(|k| k.is_active(tol)).collect()
    }

    /// True if no kink is active at `tol`.
    pub fn is_smooth(&self, tol: F) -> bool {
        !self.kinks.iter().any(|k| k.is_active(tol))
    }

    /// Branch taken at every kink, in tape order.
    ///
    /// Two points of the same function with equal signatures lie on the same
    /// smooth piece as far as the tape can tell.
    pub fn signature(&self) -> Vec<i8> {
        self.kinks.iter().map(|k| k.branch).collect()
    }
}

pub(crate) fn unary_kink<F: Float>(op: UnaryOp, a: F) -> (F, i8) {
    let half = F::one() / (F::one() + F::one());
    match op {
        UnaryOp::Floor | UnaryOp::Ceil => {
            let branch = if a - a.floor() < half { 1 } else { -1 };
            (a - a.round(), branch)
        }
        _ => (a, if a >= F::zero() { 1 } else { -1 }),
    }
}

pub(crate) fn binary_kink<F: Float>(op: BinaryOp, a: F, b: F) -> (F, i8) {
    let first = match op {
        BinaryOp::Min => a <= b,
        _ => a >= b,
    };
    (a - b, if first { 1 } else { -1 })
}
