#![cfg(feature = "nalgebra")]

use approx::assert_relative_eq;
use mxtape::nalgebra_support::{call_nalgebra, hessian_nalgebra, jacobian_nalgebra, to_dmatrix};
use mxtape::CompileConfig;
use nalgebra::DVector;

mod common;
use common::*;

#[test]
fn call_with_dvectors() {
    let fun = scenario();
    let out = call_nalgebra(&fun, &[DVector::from_vec(vec![2.0]), DVector::from_vec(vec![3.0])]).unwrap();
    assert_eq!(out.len(), 1);
    assert_relative_eq!(out[0][0], 6.0 + 2.0_f64.sin(), max_relative = 1e-14);
}

#[test]
fn jacobian_densified() {
    let n = 5;
    let fun = chain(n, CompileConfig::default());
    let x = make_input(n);
    let jac = jacobian_nalgebra(&fun, &[DVector::from_vec(x.clone())], 0, 0).unwrap();
    assert_eq!(jac.shape(), (n - 1, n));
    for i in 0..n - 1 {
        assert_relative_eq!(jac[(i, i)], x[i + 1] + x[i].cos(), max_relative = 1e-14);
        assert_relative_eq!(jac[(i, i + 1)], x[i], max_relative = 1e-14);
        if i + 2 < n {
            assert_eq!(jac[(i, i + 2)], 0.0);
        }
    }
}

#[test]
fn hessian_densified() {
    let n = 4;
    let fun = rosenbrock(n, CompileConfig::default());
    let x = vec![1.0, 2.0, -0.5, 0.3];
    let hess = hessian_nalgebra(&fun, &[DVector::from_vec(x.clone())], 0, 0).unwrap();
    let expected = rosenbrock_hessian(&x);
    for r in 0..n {
        for c in 0..n {
            assert_relative_eq!(hess[(r, c)], expected[r][c], epsilon = 1e-10);
        }
    }
    assert_relative_eq!(hess, hess.transpose(), max_relative = 1e-14);
}

#[test]
fn sparse_to_dense() {
    let fun = arrow(3, CompileConfig::default());
    let mut mem = fun.memory(2, 2);
    let jac = fun.jacobian(&mut mem, &[vec![1.0, 2.0, 3.0]], 0, 0).unwrap();
    let dense = to_dmatrix(&jac);
    assert_eq!(dense.row(0).iter().copied().collect::<Vec<_>>(), vec![1.0, 1.0, 1.0]);
    assert_eq!(dense[(1, 0)], 0.0);
    assert_eq!(dense[(2, 2)], 6.0);
}

#[test]
fn wrong_input_count_is_an_error() {
    let fun = scenario();
    assert!(call_nalgebra(&fun, &[DVector::from_vec(vec![2.0])]).is_err());
}
