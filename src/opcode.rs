//! Elementwise operation tables.
//!
//! Each operation provides its value, first partials and second partials as
//! pure functions. The evaluator dispatches on these closed enums with a
//! `match`; there is no per-node virtual call in the hot loop.
//!
//! Second partials are only needed by forward-over-adjoint (Hessian) sweeps.

use std::fmt;

use num_traits::Float;

/// Unary elementwise operations.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnaryOp {
    Neg,
    Recip,
    /// Square, `a * a`.
    Sq,
    Sqrt,
    Exp,
    Ln,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Abs,
    /// `-1`, `0` or `1`. Zero derivative.
    Sign,
    /// Zero derivative but needed for re-evaluation.
    Floor,
    /// Zero derivative but needed for re-evaluation.
    Ceil,
}

/// Binary elementwise operations.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    /// `a^b` for real exponents.
    Pow,
    Atan2,
    Min,
    Max,
}

/// Which second partials of a binary operation are structurally nonzero:
/// `(∂²/∂a², ∂²/∂a∂b, ∂²/∂b²)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecondOrder {
    pub aa: bool,
    pub ab: bool,
    pub bb: bool,
}

impl UnaryOp {
    /// All unary operations, in declaration order.
    pub const ALL: [UnaryOp; 19] = [
        UnaryOp::Neg,
        UnaryOp::Recip,
        UnaryOp::Sq,
        UnaryOp::Sqrt,
        UnaryOp::Exp,
        UnaryOp::Ln,
        UnaryOp::Sin,
        UnaryOp::Cos,
        UnaryOp::Tan,
        UnaryOp::Asin,
        UnaryOp::Acos,
        UnaryOp::Atan,
        UnaryOp::Sinh,
        UnaryOp::Cosh,
        UnaryOp::Tanh,
        UnaryOp::Abs,
        UnaryOp::Sign,
        UnaryOp::Floor,
        UnaryOp::Ceil,
    ];

    /// Function name as printed and exported.
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Recip => "recip",
            UnaryOp::Sq => "sq",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Exp => "exp",
            UnaryOp::Ln => "log",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::Asin => "asin",
            UnaryOp::Acos => "acos",
            UnaryOp::Atan => "atan",
            UnaryOp::Sinh => "sinh",
            UnaryOp::Cosh => "cosh",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Abs => "fabs",
            UnaryOp::Sign => "sign",
            UnaryOp::Floor => "floor",
            UnaryOp::Ceil => "ceil",
        }
    }

    /// True if `op(0) == 0`, so the output keeps the operand's sparsity.
    pub fn preserves_zero(self) -> bool {
        !matches!(
            self,
            UnaryOp::Recip | UnaryOp::Exp | UnaryOp::Ln | UnaryOp::Cos | UnaryOp::Acos | UnaryOp::Cosh
        )
    }

    /// True if the second derivative is not identically zero.
    pub fn is_nonlinear(self) -> bool {
        !matches!(
            self,
            UnaryOp::Neg | UnaryOp::Abs | UnaryOp::Sign | UnaryOp::Floor | UnaryOp::Ceil
        )
    }

    /// True if the operation has a kink or jump (`abs`, `sign`, `floor`, `ceil`).
    pub fn is_nonsmooth(self) -> bool {
        matches!(
            self,
            UnaryOp::Abs | UnaryOp::Sign | UnaryOp::Floor | UnaryOp::Ceil
        )
    }

    /// True if the derivative is identically zero; the output then carries
    /// no dependency on the operand.
    pub fn has_zero_derivative(self) -> bool {
        matches!(self, UnaryOp::Sign | UnaryOp::Floor | UnaryOp::Ceil)
    }

    /// Evaluate the operation.
    #[inline]
    pub fn eval<T: Float>(self, a: T) -> T {
        match self {
            UnaryOp::Neg => -a,
            UnaryOp::Recip => a.recip(),
            UnaryOp::Sq => a * a,
            UnaryOp::Sqrt => a.sqrt(),
            UnaryOp::Exp => a.exp(),
            UnaryOp::Ln => a.ln(),
            UnaryOp::Sin => a.sin(),
            UnaryOp::Cos => a.cos(),
            UnaryOp::Tan => a.tan(),
            UnaryOp::Asin => a.asin(),
            UnaryOp::Acos => a.acos(),
            UnaryOp::Atan => a.atan(),
            UnaryOp::Sinh => a.sinh(),
            UnaryOp::Cosh => a.cosh(),
            UnaryOp::Tanh => a.tanh(),
            UnaryOp::Abs => a.abs(),
            UnaryOp::Sign => sign(a),
            UnaryOp::Floor => a.floor(),
            UnaryOp::Ceil => a.ceil(),
        }
    }

    /// First derivative at operand `a` with result `r`.
    #[inline]
    pub fn partial<T: Float>(self, a: T, r: T) -> T {
        let zero = T::zero();
        let one = T::one();
        let two = one + one;
        match self {
            UnaryOp::Neg => -one,
            UnaryOp::Recip => -r * r,
            UnaryOp::Sq => two * a,
            UnaryOp::Sqrt => one / (two * r),
            UnaryOp::Exp => r,
            UnaryOp::Ln => one / a,
            UnaryOp::Sin => a.cos(),
            UnaryOp::Cos => -a.sin(),
            UnaryOp::Tan => one + r * r,
            UnaryOp::Asin => one / (one - a * a).sqrt(),
            UnaryOp::Acos => -one / (one - a * a).sqrt(),
            UnaryOp::Atan => one / (one + a * a),
            UnaryOp::Sinh => a.cosh(),
            UnaryOp::Cosh => a.sinh(),
            UnaryOp::Tanh => one - r * r,
            UnaryOp::Abs => sign(a),
            UnaryOp::Sign | UnaryOp::Floor | UnaryOp::Ceil => zero,
        }
    }

    /// Second derivative at operand `a` with result `r`.
    #[inline]
    pub fn second_partial<T: Float>(self, a: T, r: T) -> T {
        let zero = T::zero();
        let one = T::one();
        let two = one + one;
        match self {
            UnaryOp::Neg | UnaryOp::Abs | UnaryOp::Sign | UnaryOp::Floor | UnaryOp::Ceil => zero,
            UnaryOp::Recip => two * r * r * r,
            UnaryOp::Sq => two,
            UnaryOp::Sqrt => -one / (two * two * r * r * r),
            UnaryOp::Exp => r,
            UnaryOp::Ln => -one / (a * a),
            UnaryOp::Sin => -r,
            UnaryOp::Cos => -r,
            UnaryOp::Tan => two * r * (one + r * r),
            UnaryOp::Asin => {
                let s = one - a * a;
                a / (s * s.sqrt())
            }
            UnaryOp::Acos => {
                let s = one - a * a;
                -a / (s * s.sqrt())
            }
            UnaryOp::Atan => {
                let s = one + a * a;
                -two * a / (s * s)
            }
            UnaryOp::Sinh => r,
            UnaryOp::Cosh => r,
            UnaryOp::Tanh => -two * r * (one - r * r),
        }
    }

    /// C expression for this operation applied to `a`.
    pub fn render_c(self, a: &str) -> String {
        match self {
            UnaryOp::Neg => format!("(-{a})"),
            UnaryOp::Recip => format!("(1.0/{a})"),
            UnaryOp::Sq => format!("({a}*{a})"),
            UnaryOp::Sign => format!("({a}>0 ? 1.0 : ({a}<0 ? -1.0 : 0.0))"),
            op => format!("{}({a})", op.name()),
        }
    }

    /// Rust expression for this operation applied to `a`.
    pub fn render_rust(self, a: &str) -> String {
        let method = match self {
            UnaryOp::Neg => return format!("(-{a})"),
            UnaryOp::Sq => return format!("({a} * {a})"),
            UnaryOp::Sign => {
                return format!("(if {a} > 0.0 {{ 1.0 }} else if {a} < 0.0 {{ -1.0 }} else {{ 0.0 }})")
            }
            UnaryOp::Recip => "recip",
            UnaryOp::Ln => "ln",
            UnaryOp::Abs => "abs",
            op => op.name(),
        };
        format!("{a}.{method}()")
    }
}

impl BinaryOp {
    /// All binary operations, in declaration order.
    pub const ALL: [BinaryOp; 8] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Pow,
        BinaryOp::Atan2,
        BinaryOp::Min,
        BinaryOp::Max,
    ];

    /// Function name as printed and exported.
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Pow => "pow",
            BinaryOp::Atan2 => "atan2",
            BinaryOp::Min => "fmin",
            BinaryOp::Max => "fmax",
        }
    }

    /// Infix symbol for arithmetic operations.
    pub fn symbol(self) -> Option<&'static str> {
        match self {
            BinaryOp::Add => Some("+"),
            BinaryOp::Sub => Some("-"),
            BinaryOp::Mul => Some("*"),
            BinaryOp::Div => Some("/"),
            _ => None,
        }
    }

    /// True if `op(0, 0) == 0`, so the output is the union of operand sparsities.
    pub fn preserves_zero(self) -> bool {
        !matches!(self, BinaryOp::Div | BinaryOp::Pow)
    }

    /// Structurally nonzero second partials.
    pub fn second_order(self) -> SecondOrder {
        let (aa, ab, bb) = match self {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Min | BinaryOp::Max => (false, false, false),
            BinaryOp::Mul => (false, true, false),
            BinaryOp::Div => (false, true, true),
            BinaryOp::Pow | BinaryOp::Atan2 => (true, true, true),
        };
        SecondOrder { aa, ab, bb }
    }

    /// True if the operation has a kink (`min`, `max`).
    pub fn is_nonsmooth(self) -> bool {
        matches!(self, BinaryOp::Min | BinaryOp::Max)
    }

    /// Evaluate the operation.
    #[inline]
    pub fn eval<T: Float>(self, a: T, b: T) -> T {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
            BinaryOp::Atan2 => a.atan2(b),
            BinaryOp::Min => {
                if a <= b {
                    a
                } else {
                    b
                }
            }
            BinaryOp::Max => {
                if a >= b {
                    a
                } else {
                    b
                }
            }
        }
    }

    /// First partials `(∂r/∂a, ∂r/∂b)` at operands `a`, `b` with result `r`.
    #[inline]
    pub fn partials<T: Float>(self, a: T, b: T, r: T) -> (T, T) {
        let zero = T::zero();
        let one = T::one();
        match self {
            BinaryOp::Add => (one, one),
            BinaryOp::Sub => (one, -one),
            BinaryOp::Mul => (b, a),
            BinaryOp::Div => {
                let inv = one / b;
                (inv, -r * inv)
            }
            BinaryOp::Pow => {
                let da = b * a.powf(b - one);
                // ∂/∂b only exists for a positive base.
                let db = if a > zero { r * a.ln() } else { zero };
                (da, db)
            }
            // Undefined at the origin; zero there.
            BinaryOp::Atan2 => {
                let d = a * a + b * b;
                if d == zero {
                    (zero, zero)
                } else {
                    (b / d, -a / d)
                }
            }
            BinaryOp::Min => {
                if a <= b {
                    (one, zero)
                } else {
                    (zero, one)
                }
            }
            BinaryOp::Max => {
                if a >= b {
                    (one, zero)
                } else {
                    (zero, one)
                }
            }
        }
    }

    /// Second partials `(∂²r/∂a², ∂²r/∂a∂b, ∂²r/∂b²)`.
    #[inline]
    pub fn second_partials<T: Float>(self, a: T, b: T, r: T) -> (T, T, T) {
        let zero = T::zero();
        let one = T::one();
        let two = one + one;
        match self {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Min | BinaryOp::Max => (zero, zero, zero),
            BinaryOp::Mul => (zero, one, zero),
            BinaryOp::Div => {
                let inv = one / b;
                (zero, -inv * inv, two * r * inv * inv)
            }
            BinaryOp::Pow => {
                let daa = b * (b - one) * a.powf(b - two);
                if a > zero {
                    let ln = a.ln();
                    (daa, a.powf(b - one) * (one + b * ln), r * ln * ln)
                } else {
                    (daa, a.powf(b - one), zero)
                }
            }
            BinaryOp::Atan2 => {
                let d = a * a + b * b;
                if d == zero {
                    return (zero, zero, zero);
                }
                let d2 = d * d;
                (-two * a * b / d2, (a * a - b * b) / d2, two * a * b / d2)
            }
        }
    }

    /// C expression for this operation applied to `a`, `b`.
    pub fn render_c(self, a: &str, b: &str) -> String {
        match self.symbol() {
            Some(s) => format!("({a}{s}{b})"),
            None => format!("{}({a}, {b})", self.name()),
        }
    }

    /// Rust expression for this operation applied to `a`, `b`.
    pub fn render_rust(self, a: &str, b: &str) -> String {
        match self {
            BinaryOp::Pow => format!("{a}.powf({b})"),
            BinaryOp::Atan2 => format!("{a}.atan2({b})"),
            BinaryOp::Min => format!("(if {a} <= {b} {{ {a} }} else {{ {b} }})"),
            BinaryOp::Max => format!("(if {a} >= {b} {{ {a} }} else {{ {b} }})"),
            op => format!("({a} {} {b})", op.symbol().unwrap_or("?")),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `-1`, `0` or `1`; NaN passes through. Unlike `Float::signum`, `sign(±0) = 0`.
#[inline]
pub fn sign<T: Float>(a: T) -> T {
    if a > T::zero() {
        T::one()
    } else if a < T::zero() {
        -T::one()
    } else if a.is_nan() {
        a
    } else {
        T::zero()
    }
}
