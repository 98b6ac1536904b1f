//! Rich diagnostic error types for the seshat learner.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]`
//! derives, providing error codes and help text. Evaluation errors are
//! special: they are recovered locally at the evaluation site and folded
//! into a `None` result, surfacing only through tracing diagnostics.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the seshat learner.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain (error codes, help text, sources) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum SeshatError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dataset(#[from] DatasetError),
}

// ---------------------------------------------------------------------------
// Evaluation errors
// ---------------------------------------------------------------------------

/// Why an expression node failed to evaluate.
///
/// All variants share one recovery path: the affected node's result (and
/// therefore every ancestor's) becomes `None`. `None` is a first-class
/// "unknown": it is never coerced to zero and never crashes abduction; it
/// only limits which revisions can succeed.
#[derive(Debug, Clone, Error, Diagnostic, PartialEq)]
pub enum EvalError {
    #[error("arity mismatch: program expects {expected} argument(s), got {actual}")]
    #[diagnostic(
        code(seshat::eval::arity_mismatch),
        help(
            "The node's child count does not match its slot's arity. Arguments \
             are never silently dropped or padded. Fix the dependency structure \
             or the slot's program."
        )
    )]
    ArityMismatch { expected: usize, actual: usize },

    #[error("domain error: {message}")]
    #[diagnostic(
        code(seshat::eval::domain),
        help("The numeric operation is undefined for these inputs (e.g. division by zero).")
    )]
    Domain { message: String },

    #[error("symbol {symbol} has no interpretation")]
    #[diagnostic(
        code(seshat::eval::missing_interpretation),
        help(
            "The semantic slot for this symbol carries no program yet. The slot \
             is filled only by the semantics collaborator's training step."
        )
    )]
    MissingInterpretation { symbol: usize },

    #[error("structural error: {message}")]
    #[diagnostic(
        code(seshat::eval::structural),
        help(
            "The dependency-head array violates the single-root/tree invariant. \
             Exactly one token must have head == -1 and every unmasked token \
             must reach the root without passing through a masked token."
        )
    )]
    Structural { message: String },

    #[error("result exceeds the representable integer range")]
    #[diagnostic(
        code(seshat::eval::overflow),
        help(
            "Checked i64 arithmetic overflowed. Pathological expressions \
             (e.g. deeply nested multiplications) produce unrepresentable \
             magnitudes; the result is treated as unknown."
        )
    )]
    Overflow,

    #[error("evaluation exceeded the depth bound of {max_depth}")]
    #[diagnostic(
        code(seshat::eval::depth_exceeded),
        help(
            "The expression tree is deeper than the configured bound. Raise \
             `max_eval_depth` if the expression is legitimate; malformed \
             dependency structures are rejected here instead of recursing \
             indefinitely."
        )
    )]
    DepthExceeded { max_depth: usize },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    #[diagnostic(
        code(seshat::config::io),
        help("Check that the config path exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    #[diagnostic(
        code(seshat::config::parse),
        help("The file must be valid TOML matching the SeshatConfig schema.")
    )]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(seshat::config::invalid),
        help("Check the SeshatConfig fields. {message}")
    )]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Snapshot errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SnapshotError {
    #[error("snapshot I/O error at {path}: {source}")]
    #[diagnostic(
        code(seshat::snapshot::io),
        help(
            "A filesystem operation on the snapshot failed. Check that the \
             directory exists and has correct permissions."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot serialization error: {source}")]
    #[diagnostic(
        code(seshat::snapshot::serde),
        help(
            "The snapshot format did not round-trip. This usually means the \
             stored state was written by an incompatible version. Retrain \
             from scratch or restore an older snapshot."
        )
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Dataset errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DatasetError {
    #[error("dataset I/O error at {path}: {source}")]
    #[diagnostic(
        code(seshat::dataset::io),
        help("Check that the dataset path exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dataset serialization error: {source}")]
    #[diagnostic(
        code(seshat::dataset::serde),
        help("The dataset file must be JSON produced by `seshat` or matching its Sample schema.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[error("sample generation stalled: {attempts} attempts without a valid expression")]
    #[diagnostic(
        code(seshat::dataset::generation_stalled),
        help(
            "Generated expressions kept evaluating to unknown (e.g. division \
             edge cases). Reduce `max_expr_depth` or change the seed."
        )
    )]
    GenerationStalled { attempts: usize },
}

/// Convenience alias for functions returning seshat results.
pub type SeshatResult<T> = std::result::Result<T, SeshatError>;
