use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FloatConst, FromPrimitive, ToPrimitive};

/// Marker trait for the element type of compiled functions (`f32`, `f64`).
///
/// Bundles the numeric and utility traits needed by the evaluator, the
/// coloring drivers and the source exporter.
pub trait Float:
    NumFloat
    + FloatConst
    + FromPrimitive
    + ToPrimitive
    + Copy
    + Send
    + Sync
    + Default
    + Debug
    + Display
    + 'static
{
    /// C spelling of the type, used by source export.
    const C_TYPE: &'static str;
    /// Rust spelling of the type, used by source export.
    const RUST_TYPE: &'static str;

    /// Convert an `f64` literal (tolerances, table constants).
    fn lit(v: f64) -> Self;
}

impl Float for f32 {
    const C_TYPE: &'static str = "float";
    const RUST_TYPE: &'static str = "f32";

    #[inline]
    fn lit(v: f64) -> Self {
        v as f32
    }
}

impl Float for f64 {
    const C_TYPE: &'static str = "double";
    const RUST_TYPE: &'static str = "f64";

    #[inline]
    fn lit(v: f64) -> Self {
        v
    }
}
