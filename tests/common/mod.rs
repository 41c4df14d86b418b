#![allow(dead_code)]

use mxtape::{compile, compile_with, BinaryOp, CompileConfig, CompiledFunction, ExprGraph, NodeId, UnaryOp};

/// `f(x, y) = x*y + sin(x)` with scalar inputs.
pub fn scenario() -> CompiledFunction<f64> {
    let mut g = ExprGraph::new();
    let x = g.scalar_symbol("x");
    let y = g.scalar_symbol("y");
    let xy = g.mul(x, y).unwrap();
    let s = g.unary(UnaryOp::Sin, x).unwrap();
    let f = g.add(xy, s).unwrap();
    compile(g, &[x, y], &[f]).unwrap()
}

/// Scalar slices `x[0..n]` of a dense column symbol.
pub fn scalars(g: &mut ExprGraph<f64>, x: NodeId, n: usize) -> Vec<NodeId> {
    (0..n).map(|i| g.slice(x, &[i], &[0]).unwrap()).collect()
}

/// `f_i = x_i * x_{i+1} + sin(x_i)` for `i < n-1`; bidiagonal Jacobian.
pub fn chain(n: usize, config: CompileConfig) -> CompiledFunction<f64> {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", n).unwrap();
    let rows: Vec<usize> = (0..n - 1).collect();
    let a = g.slice(x, &rows, &[0]).unwrap();
    let shifted: Vec<usize> = (1..n).collect();
    let b = g.slice(x, &shifted, &[0]).unwrap();
    let ab = g.mul(a, b).unwrap();
    let s = g.unary(UnaryOp::Sin, a).unwrap();
    let f = g.add(ab, s).unwrap();
    compile_with(g, &[x], &[f], config).unwrap()
}

pub fn chain_f64(x: &[f64]) -> Vec<f64> {
    (0..x.len() - 1).map(|i| x[i] * x[i + 1] + x[i].sin()).collect()
}

/// `f_0 = sum_i x_i`, `f_i = x_i^2` for `i >= 1`: one dense row over a diagonal.
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

/// Extended Rosenbrock, scalar output, tridiagonal Hessian.
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

pub fn rosenbrock_hessian(x: &[f64]) -> Vec<Vec<f64>> {
    let n = x.len();
    let mut h = vec![vec![0.0; n]; n];
    for i in 0..n - 1 {
        h[i][i] += 2.0 - 400.0 * (x[i + 1] - 3.0 * x[i] * x[i]);
        h[i][i + 1] += -400.0 * x[i];
        h[i + 1][i] += -400.0 * x[i];
        h[i + 1][i + 1] += 200.0;
    }
    h
}

/// Mixed nonlinear function of two vector inputs, used for duality checks.
pub fn mixed() -> CompiledFunction<f64> {
    mixed_with(CompileConfig::default())
}

pub fn mixed_with(config: CompileConfig) -> CompiledFunction<f64> {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", 3).unwrap();
    let p = g.scalar_symbol("p");
    let e = g.unary(UnaryOp::Exp, x).unwrap();
    let px = g.binary(BinaryOp::Mul, p, x).unwrap();
    let t = g.unary(UnaryOp::Tanh, px).unwrap();
    let den = g_plus_two(&mut g, x);
    let q = g.div(e, den).unwrap();
    let f0 = g.add(q, t).unwrap();
    let xt = g.transpose(x).unwrap();
    let f1 = g.binary(BinaryOp::Atan2, xt, p).unwrap();
    compile_with(g, &[x, p], &[f0, f1], config).unwrap()
}

fn g_plus_two(g: &mut ExprGraph<f64>, x: NodeId) -> NodeId {
    let two = g.scalar(2.0);
    let sq = g.unary(UnaryOp::Sq, x).unwrap();
    g.add(sq, two).unwrap()
}

/// Dense Jacobian of output `oind` w.r.t. input `iind` by central differences.
pub fn fd_jacobian(
    fun: &CompiledFunction<f64>,
    inputs: &[Vec<f64>],
    oind: usize,
    iind: usize,
    h: f64,
) -> Vec<Vec<f64>> {
    let nout = fun.output_sparsity(oind).unwrap().nnz();
    let nin = inputs[iind].len();
    let mut jac = vec![vec![0.0; nin]; nout];
    for c in 0..nin {
        let mut plus = inputs.to_vec();
        let mut minus = inputs.to_vec();
        plus[iind][c] += h;
        minus[iind][c] -= h;
        let fp = fun.call(&plus).unwrap();
        let fm = fun.call(&minus).unwrap();
        for r in 0..nout {
            jac[r][c] = (fp[oind][r] - fm[oind][r]) / (2.0 * h);
        }
    }
    jac
}

/// Reference Jacobian with one forward sweep per column, no coloring.
pub fn column_jacobian(fun: &CompiledFunction<f64>, inputs: &[Vec<f64>], oind: usize, iind: usize) -> Vec<Vec<f64>> {
    let nout = fun.output_sparsity(oind).unwrap().nnz();
    let nin = inputs[iind].len();
    let mut mem = fun.memory(1, 0);
    let mut jac = vec![vec![0.0; nin]; nout];
    for c in 0..nin {
        let mut seed: Vec<Vec<f64>> = inputs.iter().map(|x| vec![0.0; x.len()]).collect();
        seed[iind][c] = 1.0;
        let ev = fun.evaluate(&mut mem, inputs, &[seed], &[]).unwrap();
        for r in 0..nout {
            jac[r][c] = ev.fwd_sens[0][oind][r];
        }
    }
    jac
}

pub fn make_input(n: usize) -> Vec<f64> {
    (0..n).map(|i| 0.5 + 0.1 * i as f64).collect()
}
