//! Arena of expression nodes.
//!
//! Nodes are appended and addressed by [`NodeId`]. The builder methods only
//! reference existing ids, so a graph built through them is acyclic. A graph
//! obtained by deserialization is checked again by
//! [`compile`](crate::function::compile).

use std::sync::Arc;

use crate::error::{Error, Result, StructuralError};
use crate::float::Float;
use crate::node::{infer_sparsity, GatherKind, Node, NodeId, NodeKind, IF_ELSE_TOL};
use crate::opcode::{BinaryOp, UnaryOp};
use crate::sparsity::Sparsity;

/// A DAG of expression nodes over element type `F`.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprGraph<F> {
    nodes: Vec<Node<F>>,
}

impl<F: Float> ExprGraph<F> {
    /// Create an empty graph.
    pub fn new() -> Self {
        ExprGraph { nodes: Vec::new() }
    }

    /// Number of nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[Node<F>] {
        &self.nodes
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Result<&Node<F>> {
        self.nodes.get(id.index()).ok_or_else(|| {
            Error::structural("ExprGraph::node", StructuralError::UnknownNode { node: id })
        })
    }

    /// Output sparsity of a node.
    pub fn sparsity(&self, id: NodeId) -> Result<&Arc<Sparsity>> {
        Ok(&self.node(id)?.sparsity)
    }

    /// True if no node has a kink or a jump.
    pub fn is_smooth(&self) -> bool {
        self.nodes.iter().all(|n| n.kind.is_smooth())
    }

    fn next_id(&self) -> NodeId {
        NodeId(self.nodes.len() as u32)
    }

    fn push_raw(&mut self, kind: NodeKind<F>, deps: Vec<NodeId>, sparsity: Arc<Sparsity>) -> NodeId {
        let id = self.next_id();
        self.nodes.push(Node {
            kind,
            deps,
            sparsity,
        });
        id
    }

    // ── Leaves ──

    /// Symbolic leaf with the given sparsity.
    pub fn symbol(&mut self, name: impl Into<String>, sparsity: Sparsity) -> NodeId {
        self.push_raw(
            NodeKind::Symbolic { name: name.into() },
            Vec::new(),
            Arc::new(sparsity),
        )
    }

    /// Dense 1x1 symbolic leaf.
    pub fn scalar_symbol(&mut self, name: impl Into<String>) -> NodeId {
        self.symbol(name, Sparsity::scalar())
    }

    /// Dense `n × 1` symbolic leaf.
    pub fn vector_symbol(&mut self, name: impl Into<String>, n: usize) -> Result<NodeId> {
        Ok(self.symbol(name, Sparsity::column(n)?))
    }

    /// Dense `nrow × ncol` symbolic leaf.
    pub fn matrix_symbol(&mut self, name: impl Into<String>, nrow: usize, ncol: usize) -> Result<NodeId> {
        Ok(self.symbol(name, Sparsity::dense(nrow, ncol)?))
    }

    /// Constant leaf with one value per nonzero of `sparsity`.
    pub fn constant(&mut self, sparsity: Sparsity, values: Vec<F>) -> Result<NodeId> {
        if values.len() != sparsity.nnz() {
            return Err(Error::structural(
                "ExprGraph::constant",
                StructuralError::ConstantLength {
                    expected: sparsity.nnz(),
                    got: values.len(),
                },
            ));
        }
        Ok(self.push_raw(NodeKind::Constant { values }, Vec::new(), Arc::new(sparsity)))
    }

    /// Dense 1x1 constant.
    pub fn scalar(&mut self, value: F) -> NodeId {
        self.push_raw(
            NodeKind::Constant {
                values: vec![value],
            },
            Vec::new(),
            Arc::new(Sparsity::scalar()),
        )
    }

    /// Dense constant from row-major values.
    pub fn dense_constant(&mut self, nrow: usize, ncol: usize, values: Vec<F>) -> Result<NodeId> {
        self.constant(Sparsity::dense(nrow, ncol)?, values)
    }

    // ── Operations ──

    /// Push an operation node, checking arity and operand shapes.
    ///
    /// Leaves and gathers are built with their dedicated methods since their
    /// sparsity cannot be derived from the operands.
    pub fn push_node(&mut self, kind: NodeKind<F>, deps: &[NodeId]) -> Result<NodeId> {
        kind.check_arity(deps.len())?;
        let sps = deps
            .iter()
            .map(|&d| self.sparsity(d))
            .collect::<Result<Vec<_>>>()?;
        match infer_sparsity(&kind, &sps)? {
            Some(sparsity) => Ok(self.push_raw(kind, deps.to_vec(), sparsity)),
            None => Err(Error::structural(
                "push_node",
                StructuralError::InvalidNode {
                    node: self.next_id(),
                    detail: format!("{} nodes must be built with their own constructor", kind.name()),
                },
            )),
        }
    }

    /// `op(a)` on every nonzero.
    pub fn unary(&mut self, op: UnaryOp, a: NodeId) -> Result<NodeId> {
        self.push_node(NodeKind::Unary(op), &[a])
    }

    /// `op(a, b)`. A 1x1 operand is broadcast against a matrix operand.
    pub fn binary(&mut self, op: BinaryOp, a: NodeId, b: NodeId) -> Result<NodeId> {
        let sa = self.sparsity(a)?;
        let sb = self.sparsity(b)?;
        let kind = if sa.shape() == sb.shape() {
            NodeKind::Binary(op)
        } else if sa.is_scalar() {
            NodeKind::ScalarMatrix(op)
        } else if sb.is_scalar() {
            NodeKind::MatrixScalar(op)
        } else {
            NodeKind::Binary(op)
        };
        self.push_node(kind, &[a, b])
    }

    /// `op(s, m)` with a 1x1 `s`.
    pub fn scalar_matrix(&mut self, op: BinaryOp, s: NodeId, m: NodeId) -> Result<NodeId> {
        self.push_node(NodeKind::ScalarMatrix(op), &[s, m])
    }

    /// `op(m, s)` with a 1x1 `s`.
    pub fn matrix_scalar(&mut self, op: BinaryOp, m: NodeId, s: NodeId) -> Result<NodeId> {
        self.push_node(NodeKind::MatrixScalar(op), &[m, s])
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.binary(BinaryOp::Add, a, b)
    }

    pub fn sub(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.binary(BinaryOp::Sub, a, b)
    }

    pub fn mul(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.binary(BinaryOp::Mul, a, b)
    }

    pub fn div(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.binary(BinaryOp::Div, a, b)
    }

    /// `a` where `|c| < 1e-6`, zero otherwise.
    pub fn if_else(&mut self, c: NodeId, a: NodeId) -> Result<NodeId> {
        self.if_else_with_tol(c, a, F::lit(IF_ELSE_TOL))
    }

    /// `a` where `|c| < tol`, zero otherwise. `tol` must be finite and non-negative.
    pub fn if_else_with_tol(&mut self, c: NodeId, a: NodeId, tol: F) -> Result<NodeId> {
        if !tol.is_finite() || tol < F::zero() {
            return Err(Error::structural(
                "ExprGraph::if_else",
                StructuralError::InvalidNode {
                    node: self.next_id(),
                    detail: format!("tolerance {tol} must be finite and non-negative"),
                },
            ));
        }
        self.push_node(NodeKind::IfElse { tol }, &[c, a])
    }

    // ── Structural ──

    /// Gather node with an explicit nonzero map.
    pub fn gather(
        &mut self,
        kind: GatherKind,
        deps: &[NodeId],
        sparsity: Sparsity,
        map: Vec<(u32, u32)>,
    ) -> Result<NodeId> {
        for &d in deps {
            self.node(d)?;
        }
        let id = self.next_id();
        check_gather(&self.nodes, id, deps, &sparsity, &map)?;
        Ok(self.push_raw(
            NodeKind::Gather { kind, map },
            deps.to_vec(),
            Arc::new(sparsity),
        ))
    }

    /// Reinterpret `a` as `nrow × ncol` (row-major).
    pub fn reshape(&mut self, a: NodeId, nrow: usize, ncol: usize) -> Result<NodeId> {
        let sp = self.sparsity(a)?.reshape(nrow, ncol)?;
        let map = (0..sp.nnz() as u32).map(|k| (0, k)).collect();
        self.gather(GatherKind::Reshape, &[a], sp, map)
    }

    pub fn transpose(&mut self, a: NodeId) -> Result<NodeId> {
        let (sp, mapping) = self.sparsity(a)?.transpose_with_mapping();
        let map = mapping.into_iter().map(|k| (0, k)).collect();
        self.gather(GatherKind::Transpose, &[a], sp, map)
    }

    /// Submatrix `a[rows, cols]`; indices may repeat.
    pub fn slice(&mut self, a: NodeId, rows: &[usize], cols: &[usize]) -> Result<NodeId> {
        let (sp, mapping) = self.sparsity(a)?.sub(rows, cols)?;
        let map = mapping.into_iter().map(|k| (0, k)).collect();
        self.gather(GatherKind::Slice, &[a], sp, map)
    }

    pub fn horzcat(&mut self, parts: &[NodeId]) -> Result<NodeId> {
        let sps = parts
            .iter()
            .map(|&p| self.sparsity(p).map(Arc::clone))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<&Sparsity> = sps.iter().map(|s| s.as_ref()).collect();
        let sp = Sparsity::horzcat(&refs)?;
        let mut map = Vec::with_capacity(sp.nnz());
        for r in 0..sp.nrow() {
            for (p, part) in sps.iter().enumerate() {
                let base = part.row_ptr()[r];
                map.extend((0..part.row(r).len()).map(|j| (p as u32, (base + j) as u32)));
            }
        }
        self.gather(GatherKind::Horzcat, parts, sp, map)
    }

    pub fn vertcat(&mut self, parts: &[NodeId]) -> Result<NodeId> {
        let sps = parts
            .iter()
            .map(|&p| self.sparsity(p).map(Arc::clone))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<&Sparsity> = sps.iter().map(|s| s.as_ref()).collect();
        let sp = Sparsity::vertcat(&refs)?;
        let map = sps
            .iter()
            .enumerate()
            .flat_map(|(p, part)| (0..part.nnz() as u32).map(move |k| (p as u32, k)))
            .collect();
        self.gather(GatherKind::Vertcat, parts, sp, map)
    }

    /// Re-check one node against its operands.
    ///
    /// Builder methods already guarantee this; deserialized graphs do not.
    pub(crate) fn check_node(&self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        for &d in &node.deps {
            self.node(d)?;
        }
        node.kind.check_arity(node.deps.len())?;
        let invalid = |detail: String| {
            Error::structural("compile", StructuralError::InvalidNode { node: id, detail })
        };
        match &node.kind {
            NodeKind::Symbolic { .. } => Ok(()),
            NodeKind::Constant { values } => {
                if values.len() == node.sparsity.nnz() {
                    Ok(())
                } else {
                    Err(Error::structural(
                        "compile",
                        StructuralError::ConstantLength {
                            expected: node.sparsity.nnz(),
                            got: values.len(),
                        },
                    ))
                }
            }
            NodeKind::Gather { map, .. } => check_gather(&self.nodes, id, &node.deps, &node.sparsity, map),
            kind => {
                if let NodeKind::IfElse { tol } = kind {
                    if !tol.is_finite() || *tol < F::zero() {
                        return Err(invalid(format!("invalid tolerance {tol}")));
                    }
                }
                let sps: Vec<&Arc<Sparsity>> =
                    node.deps.iter().map(|d| &self.nodes[d.index()].sparsity).collect();
                match infer_sparsity(kind, &sps)? {
                    Some(expected) if *expected == *node.sparsity => Ok(()),
                    _ => Err(invalid(format!(
                        "stored sparsity {} does not match its operands",
                        node.sparsity
                    ))),
                }
            }
        }
    }
}

fn check_gather<F>(
    nodes: &[Node<F>],
    id: NodeId,
    deps: &[NodeId],
    sparsity: &Sparsity,
    map: &[(u32, u32)],
) -> Result<()> {
    let invalid = |detail: String| {
        Error::structural("gather", StructuralError::InvalidNode { node: id, detail })
    };
    if map.len() != sparsity.nnz() {
        return Err(invalid(format!(
            "map has {} entries for {} nonzeros",
            map.len(),
            sparsity.nnz()
        )));
    }
    for &(d, k) in map {
        let dep = deps
            .get(d as usize)
            .ok_or_else(|| invalid(format!("operand {d} out of range")))?;
        let nnz = nodes[dep.index()].sparsity.nnz();
        if k as usize >= nnz {
            return Err(invalid(format!("nonzero {k} of operand {d} out of range ({nnz})")));
        }
    }
    Ok(())
}
