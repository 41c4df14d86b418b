use approx::assert_relative_eq;
use mxtape::{compile, compile_with, CompileConfig, DimensionError, Error, ExprGraph, UnaryOp};

mod common;
use common::*;

#[test]
fn scenario_value() {
    let fun = scenario();
    let out = fun.call(&[vec![2.0], vec![3.0]]).unwrap();
    assert_relative_eq!(out[0][0], 6.0 + 2.0_f64.sin(), max_relative = 1e-14);
    assert_relative_eq!(out[0][0], 6.9093, epsilon = 1e-4);
}

#[test]
fn scenario_forward() {
    let fun = scenario();
    let mut mem = fun.memory(1, 0);
    let ev = fun
        .evaluate(&mut mem, &[vec![2.0], vec![3.0]], &[vec![vec![1.0], vec![0.0]]], &[])
        .unwrap();
    assert_relative_eq!(ev.fwd_sens[0][0][0], 3.0 + 2.0_f64.cos(), max_relative = 1e-14);
    assert_relative_eq!(ev.fwd_sens[0][0][0], 2.5839, epsilon = 1e-4);
    assert!(ev.adj_sens.is_empty());
}

#[test]
fn scenario_adjoint() {
    let fun = scenario();
    let mut mem = fun.memory(0, 1);
    let ev = fun
        .evaluate(&mut mem, &[vec![2.0], vec![3.0]], &[], &[vec![vec![1.0]]])
        .unwrap();
    assert_relative_eq!(ev.outputs[0][0], 6.9093, epsilon = 1e-4);
    assert_relative_eq!(ev.adj_sens[0][0][0], 2.5839, epsilon = 1e-4);
    assert_relative_eq!(ev.adj_sens[0][1][0], 2.0, max_relative = 1e-14);
}

#[test]
fn forward_and_adjoint_in_one_call() {
    let fun = scenario();
    let mut mem = fun.memory(2, 2);
    let fwd = vec![vec![vec![1.0], vec![0.0]], vec![vec![0.0], vec![1.0]]];
    let adj = vec![vec![vec![1.0]], vec![vec![-2.0]]];
    let ev = fun.evaluate(&mut mem, &[vec![2.0], vec![3.0]], &fwd, &adj).unwrap();

    let dfdx = 3.0 + 2.0_f64.cos();
    assert_relative_eq!(ev.fwd_sens[0][0][0], dfdx, max_relative = 1e-14);
    assert_relative_eq!(ev.fwd_sens[1][0][0], 2.0, max_relative = 1e-14);
    assert_relative_eq!(ev.adj_sens[1][0][0], -2.0 * dfdx, max_relative = 1e-14);
    assert_relative_eq!(ev.adj_sens[1][1][0], -4.0, max_relative = 1e-14);
}

#[test]
fn memory_is_reusable() {
    let fun = scenario();
    let mut mem = fun.memory(1, 1);
    let seeds = [vec![vec![1.0], vec![1.0]]];
    let adj = [vec![vec![1.0]]];
    let a = fun.evaluate(&mut mem, &[vec![0.3], vec![-1.2]], &seeds, &adj).unwrap();
    let _ = fun.evaluate(&mut mem, &[vec![5.0], vec![7.0]], &seeds, &adj).unwrap();
    let b = fun.evaluate(&mut mem, &[vec![0.3], vec![-1.2]], &seeds, &adj).unwrap();
    assert_eq!(a, b);
}

#[test]
fn compact_layout_matches_full() {
    let x = make_input(6);
    let compact = chain(6, CompileConfig::default());
    let full = chain(6, CompileConfig::default().reuse_work(false));
    assert!(compact.compact_size() <= compact.full_size());
    assert_eq!(full.required_memory(0, 0).work, full.full_size());

    let seed = vec![vec![(0..6).map(|i| i as f64 - 2.0).collect::<Vec<_>>()]];
    let mut m1 = compact.memory(1, 0);
    let mut m2 = full.memory(1, 0);
    let a = compact.evaluate(&mut m1, &[x.clone()], &seed, &[]).unwrap();
    let b = full.evaluate(&mut m2, &[x.clone()], &seed, &[]).unwrap();
    assert_eq!(a, b);
    for (v, e) in a.outputs[0].iter().zip(chain_f64(&x)) {
        assert_relative_eq!(*v, e, max_relative = 1e-14);
    }
}

#[test]
fn required_memory_uses_full_layout_for_adjoints() {
    let fun = chain(8, CompileConfig::default());
    assert_eq!(fun.required_memory(3, 0).work, fun.compact_size());
    assert_eq!(fun.required_memory(0, 1).work, fun.full_size());
    let sizes = fun.required_memory(2, 1);
    assert_eq!(sizes.n_second_order(), 2);
    assert_eq!(sizes.total(), fun.full_size() * 6);
}

#[test]
fn wrong_input_count() {
    let fun = scenario();
    let err = fun.call(&[vec![1.0]]).unwrap_err();
    assert!(matches!(
        err,
        Error::Dimension {
            op: "evaluate",
            reason: DimensionError::Mismatch { expected: 2, got: 1, .. }
        }
    ));
}

#[test]
fn wrong_input_length() {
    let fun = scenario();
    let err = fun.call(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
    match err {
        Error::Dimension {
            reason: DimensionError::Mismatch { what, expected, got },
            ..
        } => {
            assert_eq!(what, "nonzeros of input 0");
            assert_eq!((expected, got), (1, 2));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn wrong_seed_shape() {
    let fun = scenario();
    let mut mem = fun.memory(1, 1);
    let inputs = [vec![2.0], vec![3.0]];
    assert!(fun.evaluate(&mut mem, &inputs, &[vec![vec![1.0]]], &[]).is_err());
    assert!(fun.evaluate(&mut mem, &inputs, &[], &[vec![vec![1.0, 2.0]]]).is_err());
}

#[test]
fn memory_too_small() {
    let fun = scenario();
    let mut mem = fun.memory(0, 0);
    let err = fun
        .evaluate(&mut mem, &[vec![2.0], vec![3.0]], &[vec![vec![1.0], vec![0.0]]], &[])
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Dimension {
            reason: DimensionError::Memory {
                what: "forward directions",
                needed: 1,
                available: 0
            },
            ..
        }
    ));

    let fun = chain(10, CompileConfig::default());
    let mut mem = fun.memory(0, 0);
    let err = fun
        .evaluate(&mut mem, &[make_input(10)], &[], &[vec![vec![1.0; 9]]])
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Dimension {
            reason: DimensionError::Memory { .. },
            ..
        }
    ));
}

#[test]
fn non_finite_value_is_reported() {
    let mut g = ExprGraph::<f64>::new();
    let x = g.scalar_symbol("x");
    let l = g.unary(UnaryOp::Ln, x).unwrap();
    let fun = compile(g, &[x], &[l]).unwrap();
    let err = fun.call(&[vec![-1.0]]).unwrap_err();
    assert!(matches!(err, Error::Numeric { op: "evaluate", nz: 0, .. }));
}

#[test]
fn non_finite_allowed_when_unchecked() {
    let mut g = ExprGraph::<f64>::new();
    let x = g.scalar_symbol("x");
    let l = g.unary(UnaryOp::Ln, x).unwrap();
    let fun = compile_with(g, &[x], &[l], CompileConfig::default().check_finite(false)).unwrap();
    let out = fun.call(&[vec![-1.0]]).unwrap();
    assert!(out[0][0].is_nan());
}

#[test]
fn empty_graph_compiles_and_evaluates() {
    let fun = compile(ExprGraph::<f64>::new(), &[], &[]).unwrap();
    assert_eq!(fun.n_in(), 0);
    assert_eq!(fun.n_out(), 0);
    assert_eq!(fun.n_elements(), 0);
    assert!(fun.call(&[]).unwrap().is_empty());
    let mut mem = fun.memory(0, 1);
    let ev = fun.evaluate(&mut mem, &[], &[], &[vec![]]).unwrap();
    assert_eq!(ev.adj_sens, vec![Vec::<Vec<f64>>::new()]);
}

#[test]
fn input_as_output() {
    let mut g = ExprGraph::<f64>::new();
    let x = g.vector_symbol("x", 3).unwrap();
    let y = g.scalar_symbol("y");
    let fun = compile(g, &[x, y], &[x]).unwrap();
    let mut mem = fun.memory(0, 1);
    let ev = fun
        .evaluate(&mut mem, &[vec![1.0, 2.0, 3.0], vec![4.0]], &[], &[vec![vec![1.0, 0.5, 0.25]]])
        .unwrap();
    assert_eq!(ev.outputs[0], vec![1.0, 2.0, 3.0]);
    assert_eq!(ev.adj_sens[0][0], vec![1.0, 0.5, 0.25]);
    assert_eq!(ev.adj_sens[0][1], vec![0.0]);
}

#[test]
fn unused_input_has_zero_sensitivity() {
    let mut g = ExprGraph::<f64>::new();
    let x = g.scalar_symbol("x");
    let y = g.scalar_symbol("y");
    let e = g.unary(UnaryOp::Exp, x).unwrap();
    let fun = compile(g, &[x, y], &[e]).unwrap();
    let mut mem = fun.memory(1, 1);
    let ev = fun
        .evaluate(&mut mem, &[vec![0.0], vec![9.0]], &[vec![vec![0.0], vec![1.0]]], &[vec![vec![1.0]]])
        .unwrap();
    assert_eq!(ev.fwd_sens[0][0][0], 0.0);
    assert_eq!(ev.adj_sens[0][1][0], 0.0);
    assert_relative_eq!(ev.adj_sens[0][0][0], 1.0);
}

#[test]
fn gathers_move_nonzeros() {
    let mut g = ExprGraph::<f64>::new();
    let a = g.matrix_symbol("a", 2, 3).unwrap();
    let t = g.transpose(a).unwrap();
    let r = g.reshape(t, 1, 6).unwrap();
    let b = g.scalar_symbol("b");
    let h = g.horzcat(&[r, b]).unwrap();
    let fun = compile(g, &[a, b], &[t, h]).unwrap();

    let out = fun
        .call(&[vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![7.0]])
        .unwrap();
    assert_eq!(out[0], vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    assert_eq!(out[1], vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0, 7.0]);

    let mut mem = fun.memory(0, 1);
    let seed = vec![vec![0.0; 6], vec![1.0, 0.0, 0.0, 0.0, 0.0, 10.0, 100.0]];
    let ev = fun
        .evaluate(&mut mem, &[vec![1.0; 6], vec![1.0]], &[], &[seed])
        .unwrap();
    assert_eq!(ev.adj_sens[0][0], vec![1.0, 0.0, 0.0, 0.0, 0.0, 10.0]);
    assert_eq!(ev.adj_sens[0][1], vec![100.0]);
}

#[test]
fn display_lists_the_tape() {
    let fun = scenario();
    let text = fun.to_string();
    assert!(text.contains("@0 = input[0]"), "{text}");
    assert!(text.contains("@2 = (@0*@1)"), "{text}");
    assert!(text.contains("@3 = sin(@0)"), "{text}");
    assert!(text.contains("@4 = (@2+@3)"), "{text}");
    assert!(text.contains("output[0] = @4"), "{text}");
}

#[test]
fn display_of_nodes() {
    let mut g = ExprGraph::<f64>::new();
    let x = g.scalar_symbol("x");
    let y = g.scalar_symbol("y");
    let xy = g.mul(x, y).unwrap();
    let s = g.unary(UnaryOp::Sin, x).unwrap();
    let t = g.if_else_with_tol(x, y, 0.5).unwrap();
    let node = |id| g.node(id).unwrap().to_string();
    assert_eq!(node(x), "x");
    assert_eq!(node(xy), "(@0*@1)");
    assert_eq!(node(s), "sin(@0)");
    assert_eq!(node(t), "if_else(@0, @1, tol=0.5)");
}

#[test]
fn f32_evaluation() {
    let mut g = ExprGraph::<f32>::new();
    let x = g.scalar_symbol("x");
    let y = g.scalar_symbol("y");
    let xy = g.mul(x, y).unwrap();
    let s = g.unary(UnaryOp::Sin, x).unwrap();
    let f = g.add(xy, s).unwrap();
    let fun = compile(g, &[x, y], &[f]).unwrap();
    let out = fun.call(&[vec![2.0], vec![3.0]]).unwrap();
    assert_relative_eq!(out[0][0], 6.0 + 2.0_f32.sin(), max_relative = 1e-6);
}

#[test]
fn atan2_at_origin_has_zero_sensitivity() {
    let mut g = ExprGraph::<f64>::new();
    let x = g.scalar_symbol("x");
    let y = g.scalar_symbol("y");
    let t = g.binary(mxtape::BinaryOp::Atan2, x, y).unwrap();
    let xy = g.mul(x, y).unwrap();
    let f = g.add(t, xy).unwrap();
    let fun = compile(g, &[x, y], &[f]).unwrap();

    let mut mem = fun.memory(1, 1);
    let origin = [vec![0.0], vec![0.0]];
    let ev = fun
        .evaluate(&mut mem, &origin, &[vec![vec![1.0], vec![1.0]]], &[vec![vec![1.0]]])
        .unwrap();
    assert_eq!(ev.outputs[0], vec![0.0]);
    assert_eq!(ev.fwd_sens[0][0], vec![0.0]);
    assert_eq!(ev.adj_sens[0], vec![vec![0.0], vec![0.0]]);

    let hess = fun.hessian(&mut fun.memory(2, 1), &origin, 0, 0).unwrap();
    assert!(hess.values().iter().all(|v| v.is_finite()));

    // Away from the origin the partials are b/d and -a/d.
    let ev = fun
        .evaluate(&mut mem, &[vec![1.0], vec![1.0]], &[], &[vec![vec![1.0]]])
        .unwrap();
    assert_relative_eq!(ev.adj_sens[0][0][0], 1.5);
    assert_relative_eq!(ev.adj_sens[0][1][0], 0.5);
}
