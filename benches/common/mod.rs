#![allow(dead_code)]

use mxtape::{compile_with, CompileConfig, CompiledFunction, ExprGraph, NodeId, UnaryOp};

// ─── Inputs ────────────────────────────────────────────────────────────────

pub fn make_input(n: usize) -> Vec<f64> {
    (0..n).map(|i| 0.5 + 0.01 * i as f64).collect()
}

fn scalars(g: &mut ExprGraph<f64>, x: NodeId, n: usize) -> Vec<NodeId> {
    (0..n).map(|i| g.slice(x, &[i], &[0]).unwrap()).collect()
}

// ─── Rosenbrock ────────────────────────────────────────────────────────────
// Scalar output, tridiagonal Hessian.

pub fn rosenbrock(n: usize, config: CompileConfig) -> CompiledFunction<f64> {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", n).unwrap();
    let xs = scalars(&mut g, x, n);
    let one = g.scalar(1.0);
    let hundred = g.scalar(100.0);
    let mut sum = g.scalar(0.0);
    for i in 0..n - 1 {
        let t1 = g.sub(one, xs[i]).unwrap();
        let sq = g.unary(UnaryOp::Sq, xs[i]).unwrap();
        let t2 = g.sub(xs[i + 1], sq).unwrap();
        let a = g.unary(UnaryOp::Sq, t1).unwrap();
        let b = g.unary(UnaryOp::Sq, t2).unwrap();
        let b = g.mul(hundred, b).unwrap();
        let term = g.add(a, b).unwrap();
        sum = g.add(sum, term).unwrap();
    }
    compile_with(g, &[x], &[sum], config).unwrap()
}

pub fn rosenbrock_f64(x: &[f64]) -> f64 {
    let mut sum = 0.0;
    for i in 0..x.len() - 1 {
        let t1 = 1.0 - x[i];
        let t2 = x[i + 1] - x[i] * x[i];
        sum += t1 * t1 + 100.0 * t2 * t2;
    }
    sum
}

// ─── Banded ────────────────────────────────────────────────────────────────
// f_i = x_i * x_{i+1} + sin(x_i) on whole vectors: a handful of wide elements.

pub fn banded(n: usize, config: CompileConfig) -> CompiledFunction<f64> {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", n).unwrap();
    let head: Vec<usize> = (0..n - 1).collect();
    let tail: Vec<usize> = (1..n).collect();
    let a = g.slice(x, &head, &[0]).unwrap();
    let b = g.slice(x, &tail, &[0]).unwrap();
    let ab = g.mul(a, b).unwrap();
    let s = g.unary(UnaryOp::Sin, a).unwrap();
    let f = g.add(ab, s).unwrap();
    compile_with(g, &[x], &[f], config).unwrap()
}

// ─── Arrow ─────────────────────────────────────────────────────────────────
// One dense row over a diagonal; adjoint sweeps pay off.

pub fn arrow(n: usize, config: CompileConfig) -> CompiledFunction<f64> {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", n).unwrap();
    let xs = scalars(&mut g, x, n);
    let mut sum = xs[0];
    for &xi in &xs[1..] {
        sum = g.add(sum, xi).unwrap();
    }
    let mut parts = vec![sum];
    for &xi in &xs[1..] {
        parts.push(g.unary(UnaryOp::Sq, xi).unwrap());
    }
    let f = g.vertcat(&parts).unwrap();
    compile_with(g, &[x], &[f], config).unwrap()
}
