//! Source export of a compiled tape.
//!
//! The generated function evaluates outputs only, walking the tape in order
//! over a flat work array `w` with the same slot layout as the evaluator.
//! Structural zeros of an operand are rendered as the literal zero.

use log::debug;

use crate::error::{Error, Result, StructuralError};
use crate::float::Float;
use crate::opcode::{BinaryOp, UnaryOp};

use super::{Access, Instr};

/// Language of [`CompiledFunction::export_source`](super::CompiledFunction::export_source).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExportTarget {
    /// `int name(const T** arg, T** res)`; null output pointers are skipped.
    C,
    /// `pub fn name(arg: &[&[T]], res: &mut [&mut [T]])`.
    Rust,
}

trait Renderer {
    fn header(&self, name: &str, n_in: usize, n_out: usize, work: usize) -> String;
    fn footer(&self) -> String;
    fn literal(&self, v: f64) -> String;
    fn load_input(&self, slot: usize, i: usize, k: usize) -> String;
    fn assign(&self, slot: usize, expr: &str) -> String;
    fn store_output(&self, o: usize, slots: &[usize]) -> String;
    fn unary(&self, op: UnaryOp, a: &str) -> String;
    fn binary(&self, op: BinaryOp, a: &str, b: &str) -> String;
    fn select(&self, c: &str, tol: &str, a: &str) -> String;
}

struct CRenderer {
    ty: &'static str,
}

impl Renderer for CRenderer {
    fn header(&self, name: &str, n_in: usize, n_out: usize, work: usize) -> String {
        let ty = self.ty;
        let mut code = String::new();
        code.push_str("#include <math.h>\n\n");
        code.push_str(&format!("/* {name}: {n_in} input(s), {n_out} output(s) */\n"));
        code.push_str(&format!("int {name}(const {ty}** arg, {ty}** res) {{\n"));
        code.push_str(&format!("  {ty} w[{}];\n", work.max(1)));
        code
    }

    fn footer(&self) -> String {
        "  return 0;\n}\n".to_string()
    }

    fn literal(&self, v: f64) -> String {
        if v.is_nan() {
            "NAN".to_string()
        } else if v == f64::INFINITY {
            "INFINITY".to_string()
        } else if v == f64::NEG_INFINITY {
            "(-INFINITY)".to_string()
        } else if v < 0.0 {
            format!("({v:?})")
        } else {
            format!("{v:?}")
        }
    }

    fn load_input(&self, slot: usize, i: usize, k: usize) -> String {
        format!("  w[{slot}] = arg[{i}][{k}];\n")
    }

    fn assign(&self, slot: usize, expr: &str) -> String {
        format!("  w[{slot}] = {expr};\n")
    }

    fn store_output(&self, o: usize, slots: &[usize]) -> String {
        let mut code = format!("  if (res[{o}]) {{\n");
        for (k, s) in slots.iter().enumerate() {
            code.push_str(&format!("    res[{o}][{k}] = w[{s}];\n"));
        }
        code.push_str("  }\n");
        code
    }

    fn unary(&self, op: UnaryOp, a: &str) -> String {
        op.render_c(a)
    }

    fn binary(&self, op: BinaryOp, a: &str, b: &str) -> String {
        op.render_c(a, b)
    }

    fn select(&self, c: &str, tol: &str, a: &str) -> String {
        format!("(fabs({c}) < {tol} ? {a} : 0.0)")
    }
}

struct RustRenderer {
    ty: &'static str,
}

impl Renderer for RustRenderer {
    fn header(&self, name: &str, n_in: usize, n_out: usize, work: usize) -> String {
        let ty = self.ty;
        let mut code = String::new();
        code.push_str(&format!("/// {name}: {n_in} input(s), {n_out} output(s).\n"));
        code.push_str("#[allow(unused_variables, unused_mut, clippy::all)]\n");
        code.push_str(&format!("pub fn {name}(arg: &[&[{ty}]], res: &mut [&mut [{ty}]]) {{\n"));
        code.push_str(&format!("    let mut w = vec![0.0_{ty}; {work}];\n"));
        code
    }

    fn footer(&self) -> String {
        "}\n".to_string()
    }

    fn literal(&self, v: f64) -> String {
        let ty = self.ty;
        if v.is_nan() {
            format!("{ty}::NAN")
        } else if v == f64::INFINITY {
            format!("{ty}::INFINITY")
        } else if v == f64::NEG_INFINITY {
            format!("{ty}::NEG_INFINITY")
        } else if v < 0.0 {
            format!("({v:?}_{ty})")
        } else {
            format!("{v:?}_{ty}")
        }
    }

    fn load_input(&self, slot: usize, i: usize, k: usize) -> String {
        format!("    w[{slot}] = arg[{i}][{k}];\n")
    }

    fn assign(&self, slot: usize, expr: &str) -> String {
        format!("    w[{slot}] = {expr};\n")
    }

    fn store_output(&self, o: usize, slots: &[usize]) -> String {
        slots
            .iter()
            .enumerate()
            .map(|(k, s)| format!("    res[{o}][{k}] = w[{s}];\n"))
            .collect()
    }

    fn unary(&self, op: UnaryOp, a: &str) -> String {
        op.render_rust(a)
    }

    fn binary(&self, op: BinaryOp, a: &str, b: &str) -> String {
        op.render_rust(a, b)
    }

    fn select(&self, c: &str, tol: &str, a: &str) -> String {
        let zero = self.literal(0.0);
        format!("(if {c}.abs() < {tol} {{ {a} }} else {{ {zero} }})")
    }
}

impl<F: Float> super::CompiledFunction<F> {
    /// Render the value computation as standalone source code.
    ///
    /// `name` must be a plain identifier. The generated function reads
    /// `arg[i][k]`, the nonzero `k` of input `i`, and writes `res[o][k]`.
    ///
    /// # Example
    ///
    /// ```
    /// use mxtape::{compile, ExportTarget, ExprGraph, UnaryOp};
    ///
    /// let mut g = ExprGraph::<f64>::new();
    /// let x = g.scalar_symbol("x");
    /// let s = g.unary(UnaryOp::Sin, x).unwrap();
    /// let fun = compile(g, &[x], &[s]).unwrap();
    ///
    /// let code = fun.export_source(ExportTarget::C, "f").unwrap();
    /// assert!(code.contains("int f(const double** arg, double** res)"));
    /// assert!(code.contains("sin(w[0])"));
    /// ```
    pub fn export_source(&self, target: ExportTarget, name: &str) -> Result<String> {
        if !is_identifier(name) {
            return Err(Error::structural(
                "export_source",
                StructuralError::InvalidName {
                    name: name.to_string(),
                },
            ));
        }
        let code = match target {
            ExportTarget::C => self.render(&CRenderer { ty: F::C_TYPE }, name),
            ExportTarget::Rust => self.render(&RustRenderer { ty: F::RUST_TYPE }, name),
        };
        debug!("exported {name} ({target:?}):\n{code}");
        Ok(code)
    }

    fn render(&self, r: &dyn Renderer, name: &str) -> String {
        let layout = self.layout(0);
        let lit = |v: F| r.literal(v.to_f64().unwrap_or(f64::NAN));
        let zero = r.literal(0.0);
        let w = |s: usize| format!("w[{s}]");
        let operand = |access: &Access, offset: usize, k: usize| access.slot(offset, k).map_or(zero.clone(), w);

        let mut code = r.header(name, self.n_in(), self.n_out(), layout.size);
        for (i, el) in self.elements.iter().enumerate() {
            let o = layout.offset(i);
            let arg = |j: usize| layout.offset(el.args[j]);
            for k in 0..el.nnz {
                let expr = match &el.instr {
                    Instr::Input(input) => {
                        code.push_str(&r.load_input(o + k, *input, k));
                        continue;
                    }
                    Instr::Constant(values) => lit(values[k]),
                    Instr::Unary { op, a } => r.unary(*op, &operand(a, arg(0), k)),
                    Instr::Binary { op, a, b } => r.binary(*op, &operand(a, arg(0), k), &operand(b, arg(1), k)),
                    Instr::IfElse { tol, cond } => r.select(&operand(cond, arg(0), 0), &lit(*tol), &w(arg(1) + k)),
                    Instr::Gather { map, .. } => {
                        let (d, nz) = map[k];
                        w(arg(d as usize) + nz as usize)
                    }
                };
                code.push_str(&r.assign(o + k, &expr));
            }
        }
        for (out, &pos) in self.outputs.iter().enumerate() {
            let off = layout.offset(pos);
            let slots: Vec<usize> = (off..off + self.output_sparsity[out].nnz()).collect();
            code.push_str(&r.store_output(out, &slots));
        }
        code.push_str(&r.footer());
        code
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name != "_" && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
