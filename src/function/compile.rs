use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::config::CompileConfig;
use crate::error::{Error, Result, StructuralError};
use crate::float::Float;
use crate::graph::ExprGraph;
use crate::node::{NodeId, NodeKind};
use crate::sparsity::Sparsity;

use super::{Access, CompiledFunction, Element, Instr, Layout};

const OP: &str = "compile";
const UNPLACED: usize = usize::MAX;

/// Compile the cone of `outputs` with the default [`CompileConfig`].
///
/// # Example
///
/// ```
/// use mxtape::{compile, ExprGraph, UnaryOp};
///
/// let mut g = ExprGraph::<f64>::new();
/// let x = g.scalar_symbol("x");
/// let y = g.scalar_symbol("y");
/// let xy = g.mul(x, y).unwrap();
/// let s = g.unary(UnaryOp::Sin, x).unwrap();
/// let f = g.add(xy, s).unwrap();
///
/// let fun = compile(g, &[x, y], &[f]).unwrap();
/// let out = fun.call(&[vec![2.0], vec![3.0]]).unwrap();
/// assert!((out[0][0] - (6.0 + 2.0f64.sin())).abs() < 1e-12);
/// ```
pub fn compile<F: Float>(
    graph: impl Into<Arc<ExprGraph<F>>>,
    inputs: &[NodeId],
    outputs: &[NodeId],
) -> Result<CompiledFunction<F>> {
    compile_with(graph, inputs, outputs, CompileConfig::default())
}

/// Compile the cone of `outputs` with explicit options.
///
/// Fails with a structural error if a declared input is not a symbolic leaf
/// or is declared twice, if an id is dangling, if the graph has a cycle, or if
/// the outputs depend on symbolic leaves that are not declared inputs.
pub fn compile_with<F: Float>(
    graph: impl Into<Arc<ExprGraph<F>>>,
    inputs: &[NodeId],
    outputs: &[NodeId],
    config: CompileConfig,
) -> Result<CompiledFunction<F>> {
    let graph: Arc<ExprGraph<F>> = graph.into();
    let nodes = graph.nodes();
    let structural = |reason| Error::structural(OP, reason);

    // Element position of every placed node.
    let mut position = vec![UNPLACED; nodes.len()];
    let mut order: Vec<NodeId> = Vec::with_capacity(nodes.len());

    for &id in inputs {
        let node = graph.node(id).map_err(|_| structural(StructuralError::UnknownNode { node: id }))?;
        if !node.is_symbolic() {
            return Err(structural(StructuralError::NotSymbolic { node: id }));
        }
        if position[id.index()] != UNPLACED {
            return Err(structural(StructuralError::DuplicateInput { node: id }));
        }
        position[id.index()] = order.len();
        order.push(id);
    }
    for &id in outputs {
        graph.node(id).map_err(|_| structural(StructuralError::UnknownNode { node: id }))?;
    }

    // Iterative post-order DFS from the outputs.
    const NEW: u8 = 0;
    const OPEN: u8 = 1;
    const DONE: u8 = 2;
    let mut state = vec![NEW; nodes.len()];
    for &id in inputs {
        state[id.index()] = DONE;
    }
    let mut free: Vec<NodeId> = Vec::new();
    let mut stack: Vec<(NodeId, usize)> = Vec::new();
    for &root in outputs {
        if state[root.index()] != NEW {
            continue;
        }
        state[root.index()] = OPEN;
        stack.push((root, 0));
        while let Some(&(id, next)) = stack.last() {
            let node = &nodes[id.index()];
            if let Some(&dep) = node.deps.get(next) {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                if dep.index() >= nodes.len() {
                    return Err(structural(StructuralError::UnknownNode { node: dep }));
                }
                match state[dep.index()] {
                    NEW => {
                        state[dep.index()] = OPEN;
                        stack.push((dep, 0));
                    }
                    OPEN => return Err(structural(StructuralError::Cycle { node: dep })),
                    _ => {}
                }
            } else {
                stack.pop();
                state[id.index()] = DONE;
                graph.check_node(id)?;
                if node.is_symbolic() {
                    free.push(id);
                } else {
                    position[id.index()] = order.len();
                    order.push(id);
                }
            }
        }
    }

    if !free.is_empty() {
        let names = free
            .iter()
            .map(|id| match &nodes[id.index()].kind {
                NodeKind::Symbolic { name } => name.clone(),
                _ => id.to_string(),
            })
            .collect();
        return Err(structural(StructuralError::FreeSymbols { nodes: free, names }));
    }

    let mut elements = Vec::with_capacity(order.len());
    for (pos, &id) in order.iter().enumerate() {
        let node = &nodes[id.index()];
        let args: Vec<usize> = node.deps.iter().map(|d| position[d.index()]).collect();
        let dep_sparsity = |j: usize| &nodes[node.deps[j].index()].sparsity;
        let instr = match &node.kind {
            NodeKind::Symbolic { .. } => Instr::Input(pos),
            NodeKind::Constant { values } => Instr::Constant(values.clone()),
            NodeKind::Unary(op) => Instr::Unary {
                op: *op,
                a: access(&node.sparsity, dep_sparsity(0)),
            },
            NodeKind::Binary(op) => Instr::Binary {
                op: *op,
                a: access(&node.sparsity, dep_sparsity(0)),
                b: access(&node.sparsity, dep_sparsity(1)),
            },
            NodeKind::ScalarMatrix(op) => Instr::Binary {
                op: *op,
                a: scalar_access(dep_sparsity(0)),
                b: access(&node.sparsity, dep_sparsity(1)),
            },
            NodeKind::MatrixScalar(op) => Instr::Binary {
                op: *op,
                a: access(&node.sparsity, dep_sparsity(0)),
                b: scalar_access(dep_sparsity(1)),
            },
            NodeKind::IfElse { tol } => Instr::IfElse {
                tol: *tol,
                cond: scalar_access(dep_sparsity(0)),
            },
            NodeKind::Gather { kind, map } => Instr::Gather {
                kind: *kind,
                map: map.clone(),
            },
        };
        elements.push(Element {
            node: id,
            instr,
            args,
            nnz: node.sparsity.nnz(),
        });
    }

    let input_pos: Vec<usize> = (0..inputs.len()).collect();
    let output_pos: Vec<usize> = outputs.iter().map(|o| position[o.index()]).collect();
    let input_sparsity = inputs.iter().map(|i| Arc::clone(&nodes[i.index()].sparsity)).collect();
    let output_sparsity = outputs.iter().map(|o| Arc::clone(&nodes[o.index()].sparsity)).collect();
    let full = full_layout(&elements);
    let compact = compact_layout(&elements, &output_pos);

    debug!(
        "compiled {} element(s) from {} node(s): {} input(s), {} output(s), work {} full / {} compact",
        elements.len(),
        nodes.len(),
        inputs.len(),
        outputs.len(),
        full.size,
        compact.size
    );

    Ok(CompiledFunction {
        graph,
        elements,
        inputs: input_pos,
        outputs: output_pos,
        input_sparsity,
        output_sparsity,
        full,
        compact,
        config,
    })
}

fn access(out: &Sparsity, src: &Sparsity) -> Access {
    if out == src {
        Access::Same
    } else {
        Access::Mapped(out.nz_map_from(src))
    }
}

/// A broadcast 1x1 operand; without a stored nonzero it reads as zero.
fn scalar_access(src: &Sparsity) -> Access {
    if src.nnz() == 0 {
        Access::Zero
    } else {
        Access::Scalar
    }
}

/// One slot range per element, in tape order.
fn full_layout<F>(elements: &[Element<F>]) -> Layout {
    let mut offsets = Vec::with_capacity(elements.len());
    let mut size = 0;
    for el in elements {
        offsets.push(size);
        size += el.nnz;
    }
    Layout { offsets, size }
}

/// Slot ranges reused after the last consumer of a value has run.
///
/// A consumer's output range is allocated before its operands are released,
/// so an element never writes over its own operands.
fn compact_layout<F>(elements: &[Element<F>], outputs: &[usize]) -> Layout {
    let n = elements.len();
    let mut last_use: Vec<usize> = (0..n).collect();
    for (j, el) in elements.iter().enumerate() {
        for &a in &el.args {
            last_use[a] = j;
        }
    }
    for &o in outputs {
        last_use[o] = usize::MAX;
    }

    let mut free: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut offsets = vec![0; n];
    let mut released = vec![false; n];
    let mut size = 0;
    for (j, el) in elements.iter().enumerate() {
        let len = el.nnz;
        offsets[j] = match free.get_mut(&len).and_then(|blocks| blocks.pop()) {
            Some(offset) => offset,
            None => {
                let offset = size;
                size += len;
                offset
            }
        };
        for &a in el.args.iter().chain(std::iter::once(&j)) {
            if last_use[a] == j && !released[a] {
                released[a] = true;
                if elements[a].nnz > 0 {
                    free.entry(elements[a].nnz).or_default().push(offsets[a]);
                }
            }
        }
    }
    Layout { offsets, size }
}
