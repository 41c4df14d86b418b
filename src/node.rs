//! Expression nodes.
//!
//! A node is a kind tag, a fixed-arity operand list of [`NodeId`]s and one
//! output sparsity. Nodes never change after they are pushed into an
//! [`ExprGraph`](crate::graph::ExprGraph).

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result, StructuralError};
use crate::float::Float;
use crate::opcode::{BinaryOp, UnaryOp};
use crate::sparsity::Sparsity;

/// Default tolerance of the conditional select.
pub const IF_ELSE_TOL: f64 = 1e-6;

/// Stable index of a node inside its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Position of the node in the graph arena.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Which structural operation produced a gather node. Only used for printing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GatherKind {
    Reshape,
    Transpose,
    Slice,
    Horzcat,
    Vertcat,
}

impl GatherKind {
    pub fn name(self) -> &'static str {
        match self {
            GatherKind::Reshape => "reshape",
            GatherKind::Transpose => "transpose",
            GatherKind::Slice => "slice",
            GatherKind::Horzcat => "horzcat",
            GatherKind::Vertcat => "vertcat",
        }
    }
}

/// Operation carried by a node.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind<F> {
    /// Symbolic leaf, bound to a function input at compile time.
    Symbolic { name: String },
    /// Constant leaf holding one value per structural nonzero.
    Constant { values: Vec<F> },
    /// `op(a)` applied to every nonzero.
    Unary(UnaryOp),
    /// `op(a, b)` on two operands of the same shape.
    Binary(BinaryOp),
    /// `op(s, M)` with a 1x1 first operand. An empty one reads as zero.
    ScalarMatrix(BinaryOp),
    /// `op(M, s)` with a 1x1 second operand.
    MatrixScalar(BinaryOp),
    /// `a` where `|c| < tol`, zero otherwise. Operands are `[c, a]`.
    IfElse { tol: F },
    /// Pure nonzero movement: output nonzero `k` is nonzero `map[k].1` of
    /// operand `map[k].0`.
    Gather { kind: GatherKind, map: Vec<(u32, u32)> },
}

impl<F: Float> NodeKind<F> {
    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Symbolic { .. } => "symbolic",
            NodeKind::Constant { .. } => "constant",
            NodeKind::Unary(_) => "unary",
            NodeKind::Binary(_) => "binary",
            NodeKind::ScalarMatrix(_) => "scalar_matrix",
            NodeKind::MatrixScalar(_) => "matrix_scalar",
            NodeKind::IfElse { .. } => "if_else",
            NodeKind::Gather { kind, .. } => kind.name(),
        }
    }

    /// Number of operands, or `None` for variadic gathers.
    pub fn arity(&self) -> Option<usize> {
        match self {
            NodeKind::Symbolic { .. } | NodeKind::Constant { .. } => Some(0),
            NodeKind::Unary(_) => Some(1),
            NodeKind::Binary(_)
            | NodeKind::ScalarMatrix(_)
            | NodeKind::MatrixScalar(_)
            | NodeKind::IfElse { .. } => Some(2),
            NodeKind::Gather { .. } => None,
        }
    }

    /// False for kinds with a kink or a jump.
    pub fn is_smooth(&self) -> bool {
        match self {
            NodeKind::Unary(op) => !op.is_nonsmooth(),
            NodeKind::Binary(op) | NodeKind::ScalarMatrix(op) | NodeKind::MatrixScalar(op) => {
                !op.is_nonsmooth()
            }
            NodeKind::IfElse { .. } => false,
            _ => true,
        }
    }

    pub(crate) fn check_arity(&self, got: usize) -> Result<()> {
        match self.arity() {
            Some(expected) if expected != got => Err(Error::structural(
                "push_node",
                StructuralError::ArityMismatch {
                    kind: self.name(),
                    expected,
                    got,
                },
            )),
            _ => Ok(()),
        }
    }
}

/// One vertex of the expression DAG.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node<F> {
    pub(crate) kind: NodeKind<F>,
    pub(crate) deps: Vec<NodeId>,
    pub(crate) sparsity: Arc<Sparsity>,
}

impl<F: Float> Node<F> {
    pub fn kind(&self) -> &NodeKind<F> {
        &self.kind
    }

    pub fn deps(&self) -> &[NodeId] {
        &self.deps
    }

    pub fn sparsity(&self) -> &Arc<Sparsity> {
        &self.sparsity
    }

    pub fn shape(&self) -> (usize, usize) {
        self.sparsity.shape()
    }

    /// True for a symbolic leaf.
    pub fn is_symbolic(&self) -> bool {
        matches!(self.kind, NodeKind::Symbolic { .. })
    }
}

impl<F: Float> fmt::Display for Node<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dep = |i: usize| self.deps.get(i).copied().unwrap_or(NodeId(u32::MAX));
        match &self.kind {
            NodeKind::Symbolic { name } => write!(f, "{name}"),
            NodeKind::Constant { values } if values.len() == 1 => write!(f, "{}", values[0]),
            NodeKind::Constant { .. } => write!(f, "const({})", self.sparsity),
            NodeKind::Unary(op) => write!(f, "{op}({})", dep(0)),
            NodeKind::Binary(op) | NodeKind::ScalarMatrix(op) | NodeKind::MatrixScalar(op) => {
                match op.symbol() {
                    Some(s) => write!(f, "({}{s}{})", dep(0), dep(1)),
                    None => write!(f, "{op}({}, {})", dep(0), dep(1)),
                }
            }
            NodeKind::IfElse { tol } => write!(f, "if_else({}, {}, tol={tol})", dep(0), dep(1)),
            NodeKind::Gather { kind, .. } => {
                write!(f, "{}(", kind.name())?;
                for (j, d) in self.deps.iter().enumerate() {
                    if j > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{d}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Output sparsity of an operation node given its operand sparsities.
///
/// Leaves and gathers carry their sparsity explicitly; `None` for those.
pub(crate) fn infer_sparsity<F: Float>(
    kind: &NodeKind<F>,
    deps: &[&Arc<Sparsity>],
) -> Result<Option<Arc<Sparsity>>> {
    match kind {
        NodeKind::Symbolic { .. } | NodeKind::Constant { .. } | NodeKind::Gather { .. } => Ok(None),
        _ => infer_op_sparsity(kind, deps).map(Some),
    }
}

fn infer_op_sparsity<F: Float>(kind: &NodeKind<F>, deps: &[&Arc<Sparsity>]) -> Result<Arc<Sparsity>> {
    let name = kind.name();
    match kind {
        NodeKind::Unary(op) => {
            let a = deps[0];
            if op.preserves_zero() || a.is_dense() {
                Ok(Arc::clone(a))
            } else {
                Ok(Arc::new(Sparsity::dense(a.nrow(), a.ncol())?))
            }
        }
        NodeKind::Binary(op) => {
            let (a, b) = (deps[0], deps[1]);
            if a.shape() != b.shape() {
                return Err(Error::structural(
                    "push_node",
                    StructuralError::ShapeMismatch {
                        kind: name,
                        lhs: a.shape(),
                        rhs: b.shape(),
                    },
                ));
            }
            if !op.preserves_zero() {
                if a.is_dense() {
                    return Ok(Arc::clone(a));
                }
                return Ok(Arc::new(Sparsity::dense(a.nrow(), a.ncol())?));
            }
            if a == b {
                return Ok(Arc::clone(a));
            }
            Ok(Arc::new(a.union(b)?))
        }
        NodeKind::ScalarMatrix(_) => {
            require_scalar(name, deps[0])?;
            Ok(Arc::clone(deps[1]))
        }
        NodeKind::MatrixScalar(_) => {
            require_scalar(name, deps[1])?;
            Ok(Arc::clone(deps[0]))
        }
        NodeKind::IfElse { .. } => {
            require_scalar(name, deps[0])?;
            Ok(Arc::clone(deps[1]))
        }
        NodeKind::Symbolic { .. } | NodeKind::Constant { .. } | NodeKind::Gather { .. } => {
            unreachable!("leaves and gathers are handled by infer_sparsity")
        }
    }
}

fn require_scalar(kind: &'static str, sp: &Sparsity) -> Result<()> {
    if sp.is_scalar() {
        Ok(())
    } else {
        Err(Error::structural(
            "push_node",
            StructuralError::NotScalar {
                kind,
                nrow: sp.nrow(),
                ncol: sp.ncol(),
                nnz: sp.nnz(),
            },
        ))
    }
}
