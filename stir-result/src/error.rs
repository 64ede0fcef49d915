use thiserror::Error;

/// Unified error type for all STIR operations.
///
/// Errors propagate upward through the call stack using Rust's `?` operator.
/// At API boundaries, errors are typically converted to user-friendly
/// messages. Internal code can match on specific variants for fine-grained
/// error handling.
#[derive(Error, Debug)]
pub enum Error {
    /// The lowering pass met an expression it cannot stage.
    ///
    /// This is the single error kind raised by table-operation lowering.
    /// It occurs when:
    /// - a table operation outside the recognized set is encountered
    /// - a non-table expression has a table-valued child that was not
    ///   dispatched through one of the whole-table consumer cases
    /// - a table-valued expression appears in value position
    ///
    /// The message carries a rendering of the offending node. The error is
    /// non-recoverable within the pass: the lowering invocation aborts with
    /// no partial output, and the shared name generator is left untouched
    /// beyond names already consumed before the failure point.
    #[error("unsupported lowering: {0}")]
    UnsupportedLowering(String),

    /// Structural type derivation failed.
    ///
    /// Raised for malformed expression trees: reading a field a struct does
    /// not have, exploding a non-array field, mismatched operand types, or
    /// an unbound reference during derivation. These indicate a bad input
    /// tree rather than a bug in the lowering pass itself.
    #[error("type error: {0}")]
    Type(String),

    /// Internal error indicating a bug or unexpected state.
    ///
    /// This error should never occur during normal operation. It indicates
    /// violated internal invariants, such as an unbound reference reaching
    /// the evaluator or integer overflow inside a reduction.
    #[error("An internal operation failed: {0}")]
    Internal(String),
}
