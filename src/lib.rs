pub mod coloring;
pub mod config;
pub mod error;
pub mod float;
pub mod function;
pub mod graph;
pub mod matrix;
pub mod node;
pub mod nonsmooth;
pub mod opcode;
pub mod sparsity;

#[cfg(feature = "faer")]
pub mod faer_support;
#[cfg(feature = "nalgebra")]
pub mod nalgebra_support;

pub use coloring::{Coloring, Partition};
pub use config::{CompileConfig, SweepMode};
pub use error::{DimensionError, Error, Result, StructuralError};
pub use float::Float;
pub use function::{
    compile, compile_with, CompiledFunction, Evaluation, ExportTarget, HessianPlan, JacobianPlan, Memory,
    MemorySizes,
};
pub use graph::ExprGraph;
pub use matrix::SparseMatrix;
pub use node::{GatherKind, Node, NodeId, NodeKind};
pub use nonsmooth::{KinkEntry, KinkOp, NonsmoothInfo};
pub use opcode::{BinaryOp, UnaryOp};
pub use sparsity::Sparsity;
