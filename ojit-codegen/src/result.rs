//! Compiler errors.
//!
//! Builder misuse and malformed-invariant errors are bugs in this crate or its
//! caller and abort the compile of the offending function; the baseline tier
//! keeps running it. Unimplemented-opcode errors are expected and non-fatal:
//! some bytecode construct isn't supported by the optimizing tier yet, so we
//! bail out and let the function stay in baseline.

use thiserror::Error;

/// Errors produced while building or optimizing an [`crate::ir::IrGraph`].
#[derive(Debug, Error)]
pub enum CodegenError {
    /// The builder was misused: finalized twice, or finalized with no entry
    /// block. Indicates a bug in the caller driving the builder.
    #[error("builder misuse: {0}")]
    BuilderMisuse(String),

    /// A bidirectional graph invariant (input/user list symmetry,
    /// predecessor/successor symmetry) was found violated. Indicates a bug in
    /// this crate's graph mutation routines.
    #[error("malformed IR invariant: {0}")]
    MalformedInvariant(String),

    /// The bytecode the builder was asked to translate uses a construct this
    /// tier doesn't implement. Not a bug; the driver aborts the compile and
    /// falls back to the baseline tier.
    #[error("unimplemented opcode or construct: {0}")]
    Unimplemented(String),
}

/// Shorthand for a `Result` carrying a [`CodegenError`].
pub type CodegenResult<T> = Result<T, CodegenError>;
