//! Error types for schema decode/encode operations.

use thiserror::Error;

/// Error type for schema decode/encode operations.
///
/// All variants are structural failures: any of them aborts the decode or
/// encode of the current schema instance and propagates through enclosing
/// nested schemas. There is no field-level recovery.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("header mismatch in {0}")]
    HeaderMismatch(&'static str),
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEndOfInput { needed: usize, remaining: usize },
    #[error("truncated input in {0}")]
    TruncatedInput(&'static str),
    #[error("length underflow in {field}: {length}")]
    LengthUnderflow { field: &'static str, length: i64 },
    #[error("length mismatch in {field}: expected {expected}, found {actual}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("length exceeded: {0} > {1}")]
    LengthExceeded(usize, usize), // found, max
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("duplicate field: {0}")]
    DuplicateField(&'static str),
    #[error("malformed schema: {0}")]
    MalformedSchema(String),
    #[error("extra data found: {0} bytes")]
    ExtraData(usize),
    #[error("invalid bool in {0}")]
    InvalidBool(&'static str),
    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),
    #[error("unexpected type in {field}: expected {expected}")]
    UnexpectedType {
        field: &'static str,
        expected: &'static str,
    },
}
