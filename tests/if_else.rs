use approx::assert_relative_eq;
use mxtape::{compile, ExprGraph, KinkOp, UnaryOp};

fn select() -> mxtape::CompiledFunction<f64> {
    // if_else(c, exp(a))
    let mut g = ExprGraph::new();
    let c = g.scalar_symbol("c");
    let a = g.vector_symbol("a", 2).unwrap();
    let e = g.unary(UnaryOp::Exp, a).unwrap();
    let s = g.if_else(c, e).unwrap();
    compile(g, &[c, a], &[s]).unwrap()
}

#[test]
fn condition_zero_selects_branch() {
    let fun = select();
    let out = fun.call(&[vec![0.0], vec![0.0, 1.0]]).unwrap();
    assert_relative_eq!(out[0][0], 1.0);
    assert_relative_eq!(out[0][1], 1.0_f64.exp());
}

#[test]
fn condition_one_gives_zero() {
    let fun = select();
    let out = fun.call(&[vec![1.0], vec![0.0, 1.0]]).unwrap();
    assert_eq!(out[0], vec![0.0, 0.0]);
}

#[test]
fn sensitivities_follow_selected_branch() {
    let fun = select();
    let mut mem = fun.memory(1, 1);
    let fwd = vec![vec![vec![1.0], vec![1.0, 1.0]]];
    let adj = vec![vec![vec![1.0, 2.0]]];

    let ev = fun.evaluate(&mut mem, &[vec![0.0], vec![0.0, 1.0]], &fwd, &adj).unwrap();
    assert_relative_eq!(ev.fwd_sens[0][0][1], 1.0_f64.exp());
    assert_relative_eq!(ev.adj_sens[0][1][1], 2.0 * 1.0_f64.exp());
    // The condition carries no derivative.
    assert_eq!(ev.adj_sens[0][0][0], 0.0);

    let ev = fun.evaluate(&mut mem, &[vec![1.0], vec![0.0, 1.0]], &fwd, &adj).unwrap();
    assert_eq!(ev.fwd_sens[0][0], vec![0.0, 0.0]);
    assert_eq!(ev.adj_sens[0][1], vec![0.0, 0.0]);
}

#[test]
fn custom_tolerance() {
    let mut g = ExprGraph::<f64>::new();
    let c = g.scalar_symbol("c");
    let a = g.scalar_symbol("a");
    let s = g.if_else_with_tol(c, a, 0.5).unwrap();
    let fun = compile(g, &[c, a], &[s]).unwrap();
    assert_eq!(fun.call(&[vec![0.4], vec![3.0]]).unwrap()[0][0], 3.0);
    assert_eq!(fun.call(&[vec![-0.6], vec![3.0]]).unwrap()[0][0], 0.0);
}

#[test]
fn default_tolerance_boundary() {
    let fun = select();
    assert_ne!(fun.call(&[vec![5e-7], vec![0.0, 0.0]]).unwrap()[0][0], 0.0);
    assert_eq!(fun.call(&[vec![2e-6], vec![0.0, 0.0]]).unwrap()[0][0], 0.0);
}

#[test]
fn negative_tolerance_rejected() {
    let mut g = ExprGraph::<f64>::new();
    let c = g.scalar_symbol("c");
    let a = g.scalar_symbol("a");
    assert!(g.if_else_with_tol(c, a, -1.0).is_err());
    assert!(g.if_else_with_tol(c, a, f64::NAN).is_err());
}

#[test]
fn vector_condition_rejected() {
    let mut g = ExprGraph::<f64>::new();
    let c = g.vector_symbol("c", 2).unwrap();
    let a = g.scalar_symbol("a");
    assert!(g.if_else(c, a).is_err());
}

#[test]
fn select_is_reported_as_kink() {
    let fun = select();
    assert!(!fun.is_smooth());
    let info = fun.nonsmooth(&[vec![0.0], vec![0.0, 1.0]]).unwrap();
    assert_eq!(info.kinks.len(), 2);
    assert!(info.kinks.iter().all(|k| k.op == KinkOp::IfElse && k.branch == 1));
    assert_relative_eq!(info.kinks[0].switching_value, -1e-6);

    let info = fun.nonsmooth(&[vec![1.0], vec![0.0, 1.0]]).unwrap();
    assert!(info.kinks.iter().all(|k| k.branch == -1));
}

#[test]
fn condition_cuts_jacobian_dependency() {
    let fun = select();
    let sp = fun.jacobian_sparsity(0, 0).unwrap();
    assert_eq!(sp.nnz(), 0);
    let sp = fun.jacobian_sparsity(0, 1).unwrap();
    assert_eq!(sp.nnz(), 2);
    assert!(sp.has_nonzero(0, 0) && sp.has_nonzero(1, 1));
}

#[test]
fn structurally_zero_condition_selects_branch() {
    // `x[1]` of a vector stored at rows 0 and 2 only: a 1x1 without a nonzero.
    let mut g = ExprGraph::<f64>::new();
    let x = g.symbol("x", mxtape::Sparsity::from_triplets(3, 1, &[0, 2], &[0, 0]).unwrap());
    let c = g.slice(x, &[1], &[0]).unwrap();
    let a = g.vector_symbol("a", 2).unwrap();
    let picked = g.if_else(c, a).unwrap();
    let dropped = g.if_else_with_tol(c, a, 0.0).unwrap();
    assert_eq!(g.sparsity(picked).unwrap(), g.sparsity(a).unwrap());

    let fun = compile(g, &[x, a], &[picked, dropped]).unwrap();
    let inputs = [vec![3.0, 4.0], vec![1.5, -2.0]];
    let out = fun.call(&inputs).unwrap();
    assert_eq!(out[0], vec![1.5, -2.0]);
    assert_eq!(out[1], vec![0.0, 0.0]);

    let mut mem = fun.memory(1, 1);
    let ev = fun
        .evaluate(
            &mut mem,
            &inputs,
            &[vec![vec![1.0, 1.0], vec![1.0, 1.0]]],
            &[vec![vec![1.0, 1.0], vec![1.0, 1.0]]],
        )
        .unwrap();
    assert_eq!(ev.fwd_sens[0][0], vec![1.0, 1.0]);
    assert_eq!(ev.fwd_sens[0][1], vec![0.0, 0.0]);
    assert_eq!(ev.adj_sens[0][1], vec![1.0, 1.0]);
    assert_eq!(ev.adj_sens[0][0], vec![0.0, 0.0]);

    let info = fun.nonsmooth(&inputs).unwrap();
    assert_eq!(info.kinks.len(), 4);
    for k in &info.kinks {
        let expected = if k.node == picked { 1 } else { -1 };
        assert_eq!(k.branch, expected);
    }

    let code = fun.export_source(mxtape::ExportTarget::C, "pick").unwrap();
    assert!(code.contains("fabs(0.0)"), "{code}");
}
