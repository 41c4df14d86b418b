//! Error taxonomy shared by graph construction, compilation and evaluation.
//!
//! Every variant names the operation that failed and the offending index or
//! dimension. Nothing is corrected automatically: a malformed graph, a wrongly
//! sized buffer or a non-finite intermediate is always surfaced to the caller.

use thiserror::Error;

use crate::node::NodeId;

/// Result type alias using mxtape's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, compiling or evaluating a function.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed graph: cycle, arity mismatch, unresolved symbol, bad shape.
    #[error("structural error in {op}: {reason}")]
    Structural {
        /// The operation that detected the problem.
        op: &'static str,
        /// What is wrong with the graph.
        reason: StructuralError,
    },

    /// Caller-supplied buffer, seed or index does not match the compiled shapes.
    #[error("dimension error in {op}: {reason}")]
    Dimension {
        /// The operation that detected the problem.
        op: &'static str,
        /// Which dimension is wrong.
        reason: DimensionError,
    },

    /// A non-finite value was produced during evaluation.
    #[error("non-finite value in {op}: node {node}, nonzero {nz}")]
    Numeric {
        /// The operation that detected the problem.
        op: &'static str,
        /// Node whose output became non-finite.
        node: NodeId,
        /// Offending nonzero of that node's output.
        nz: usize,
    },

    /// A coloring failed its soundness check. Indicates a defect, never a
    /// property of the input.
    #[error("coloring collision in {op}: entry ({row}, {col}) shares color {color} with another entry")]
    ColoringFailure {
        /// The operation that detected the collision.
        op: &'static str,
        /// Row of the colliding entry.
        row: usize,
        /// Column of the colliding entry.
        col: usize,
        /// Color in which the collision happened.
        color: usize,
    },
}

/// Reasons for [`Error::Structural`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    /// A node kind was given the wrong number of operands.
    #[error("{kind} expects {expected} operand(s), got {got}")]
    ArityMismatch {
        /// Node kind name.
        kind: &'static str,
        /// Arity of the kind.
        expected: usize,
        /// Number of operands supplied.
        got: usize,
    },

    /// The graph contains a cycle through this node.
    #[error("cycle through node {node}")]
    Cycle {
        /// A node on the cycle.
        node: NodeId,
    },

    /// A node id does not exist in the graph.
    #[error("unknown node {node}")]
    UnknownNode {
        /// The missing id.
        node: NodeId,
    },

    /// Symbolic leaves reached from the outputs that are not declared inputs.
    #[error("free symbolic input(s): {}", .names.join(", "))]
    FreeSymbols {
        /// Ids of the unbound symbols.
        nodes: Vec<NodeId>,
        /// Names of the unbound symbols.
        names: Vec<String>,
    },

    /// A declared input is not a symbolic leaf.
    #[error("declared input {node} is not a symbolic leaf")]
    NotSymbolic {
        /// The offending node.
        node: NodeId,
    },

    /// The same symbolic leaf was declared as an input twice.
    #[error("node {node} declared as input more than once")]
    DuplicateInput {
        /// The offending node.
        node: NodeId,
    },

    /// Operand shapes are incompatible for the node kind.
    #[error("{kind}: incompatible shapes {lhs:?} and {rhs:?}")]
    ShapeMismatch {
        /// Node kind name.
        kind: &'static str,
        /// Shape of the first operand.
        lhs: (usize, usize),
        /// Shape of the second operand.
        rhs: (usize, usize),
    },

    /// An operand that must be 1×1 is not.
    #[error("{kind}: operand must be a 1x1 scalar, got {nrow}x{ncol} with {nnz} nonzero(s)")]
    NotScalar {
        /// Node kind name.
        kind: &'static str,
        /// Rows of the operand.
        nrow: usize,
        /// Columns of the operand.
        ncol: usize,
        /// Nonzeros of the operand.
        nnz: usize,
    },

    /// Constant data does not match its sparsity.
    #[error("constant has {got} value(s) for {expected} nonzero(s)")]
    ConstantLength {
        /// Nonzeros of the sparsity.
        expected: usize,
        /// Values supplied.
        got: usize,
    },

    /// A node parameter is malformed (gather map out of range, bad tolerance).
    #[error("node {node}: {detail}")]
    InvalidNode {
        /// The offending node.
        node: NodeId,
        /// Description of the problem.
        detail: String,
    },

    /// An exported function name is not a valid identifier.
    #[error("`{name}` is not a valid function name")]
    InvalidName {
        /// The rejected name.
        name: String,
    },
}

/// Reasons for [`Error::Dimension`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DimensionError {
    /// A length does not match the compiled shape.
    #[error("{what}: expected {expected}, got {got}")]
    Mismatch {
        /// Which buffer or list.
        what: String,
        /// Required length.
        expected: usize,
        /// Supplied length.
        got: usize,
    },

    /// An index is out of range.
    #[error("{what} {index} out of range (len {len})")]
    OutOfRange {
        /// Which index.
        what: &'static str,
        /// Supplied index.
        index: usize,
        /// Valid length.
        len: usize,
    },

    /// An output must be a dense 1×1 scalar for this operation.
    #[error("output {index} must be a dense 1x1 scalar, got {nrow}x{ncol} with {nnz} nonzero(s)")]
    NotScalar {
        /// Output index.
        index: usize,
        /// Rows of the output.
        nrow: usize,
        /// Columns of the output.
        ncol: usize,
        /// Nonzeros of the output.
        nnz: usize,
    },

    /// A memory block is too small for the requested sweep.
    #[error("memory block too small: {what} needs {needed}, has {available}")]
    Memory {
        /// Which buffer.
        what: &'static str,
        /// Required size.
        needed: usize,
        /// Available size.
        available: usize,
    },

    /// A dimension or nonzero count does not fit the `u32` index type.
    #[error("{what} {size} exceeds the limit {max}")]
    TooLarge {
        /// Which size.
        what: &'static str,
        /// Requested size.
        size: usize,
        /// Largest supported size.
        max: usize,
    },

    /// `nrow * ncol` overflows `usize`.
    #[error("shape {nrow}x{ncol} has more entries than fit in usize")]
    ShapeOverflow {
        /// Requested rows.
        nrow: usize,
        /// Requested columns.
        ncol: usize,
    },
}

impl Error {
    pub(crate) fn structural(op: &'static str, reason: StructuralError) -> Self {
        Error::Structural { op, reason }
    }

    pub(crate) fn dimension(op: &'static str, reason: DimensionError) -> Self {
        Error::Dimension { op, reason }
    }

    pub(crate) fn mismatch(
        op: &'static str,
        what: impl Into<String>,
        expected: usize,
        got: usize,
    ) -> Self {
        Error::dimension(
            op,
            DimensionError::Mismatch {
                what: what.into(),
                expected,
                got,
            },
        )
    }

    pub(crate) fn out_of_range(op: &'static str, what: &'static str, index: usize, len: usize) -> Self {
        Error::dimension(op, DimensionError::OutOfRange { what, index, len })
    }
}
