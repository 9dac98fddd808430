//! Error types for problem construction and solving.

use thiserror::Error;

/// Errors raised while reading an LP format stream.
///
/// Every variant carries the (line, column) position where the reader gave
/// up, so the CLI can point at the offending token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FileFormatError {
    /// The stream ended before the `end` keyword
    #[error("unexpected end of file at {line}:{column}")]
    EndOfFile {
        /// Line of the last token read
        line: usize,
        /// Column of the last token read
        column: usize,
    },

    /// A variable or label name does not start with a letter or `_`
    #[error("bad name at {line}:{column}")]
    BadName {
        /// Position line
        line: usize,
        /// Position column
        column: usize,
    },

    /// An operator other than `<`, `<=`, `=<`, `>`, `>=`, `=>`, `=`, `==`
    #[error("bad operator at {line}:{column}")]
    BadOperator {
        /// Position line
        line: usize,
        /// Position column
        column: usize,
    },

    /// An integer could not be parsed or does not fit in 32 bits
    #[error("bad integer at {line}:{column}")]
    BadInteger {
        /// Position line
        line: usize,
        /// Position column
        column: usize,
    },

    /// A real number could not be parsed
    #[error("bad number at {line}:{column}")]
    BadNumber {
        /// Position line
        line: usize,
        /// Position column
        column: usize,
    },

    /// The objective header is neither `minimize` nor `maximize`
    #[error("bad objective function type at {line}:{column}")]
    BadObjectiveFunctionType {
        /// Position line
        line: usize,
        /// Position column
        column: usize,
    },

    /// A constraint row is malformed
    #[error("bad constraint at {line}:{column}")]
    BadConstraint {
        /// Position line
        line: usize,
        /// Position column
        column: usize,
    },

    /// A bound line is malformed
    #[error("bad bound at {line}:{column}")]
    BadBound {
        /// Position line
        line: usize,
        /// Position column
        column: usize,
    },

    /// A `binary` or `general` block names an unknown or retyped variable
    #[error("unknown variable `{name}` at {line}:{column}")]
    UnknownVariable {
        /// The offending name
        name: String,
        /// Position line
        line: usize,
        /// Position column
        column: usize,
    },

    /// More variables than the solver can index
    #[error("too many variables")]
    TooManyVariables,

    /// The file stopped before a mandatory section
    #[error("incomplete file, missing `{missing}` at {line}:{column}")]
    Incomplete {
        /// The section keyword that was expected
        missing: &'static str,
        /// Position line
        line: usize,
        /// Position column
        column: usize,
    },
}

/// Errors raised while validating a parsed problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProblemError {
    /// The problem declares no variable
    #[error("empty variables")]
    EmptyVariables,

    /// The objective function has no element
    #[error("empty objective function")]
    EmptyObjective,

    /// A variable is declared but appears in no constraint
    #[error("variable `{0}` declared but unused")]
    VariableNotUsed(String),

    /// A variable bound has lower > upper
    #[error("variable `{name}` has bad bound [{min}, {max}]")]
    BadBound {
        /// Variable name
        name: String,
        /// Lower bound
        min: i32,
        /// Upper bound
        max: i32,
    },

    /// Two constraints over the same elements assert incompatible bounds
    #[error("constraint {0} asserted twice with incompatible bounds")]
    IncompatibleConstraints(usize),
}

/// Errors raised by the solver itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// No specialized kernel handles this problem
    #[error("no solver available: {0}")]
    NoSolverAvailable(String),

    /// A constraint cannot be satisfied by any assignment after tightening
    #[error("unrealisable constraint {0}")]
    UnrealisableConstraint(usize),

    /// An allocation failed while sizing the solver arrays
    #[error("not enough memory")]
    NotEnoughMemory,
}

/// Umbrella error for the whole crate.
#[derive(Error, Debug)]
pub enum RatchetError {
    /// LP format reading failed
    #[error("file format error: {0}")]
    FileFormat(#[from] FileFormatError),

    /// Problem validation failed
    #[error("problem definition error: {0}")]
    Problem(#[from] ProblemError),

    /// Solving failed
    #[error("solver error: {0}")]
    Solver(#[from] SolverError),

    /// Underlying I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RatchetError>;
