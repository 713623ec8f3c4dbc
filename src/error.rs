//! Typed errors for metadata registration and engine operations.

use std::fmt;
use thiserror::Error;

/// Raised while validating or resolving resource definitions.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("duplicate resource: {0}")]
    DuplicateResource(String),
    #[error("duplicate field: {resource}.{field}")]
    DuplicateField { resource: String, field: String },
    #[error("missing reference: {kind} '{name}' in {resource}")]
    MissingReference {
        kind: &'static str,
        resource: String,
        name: String,
    },
    #[error("empty key: {0}")]
    EmptyKey(String),
    #[error("invalid key: {resource} field {field} ({reason})")]
    InvalidKey {
        resource: String,
        field: String,
        reason: &'static str,
    },
    #[error("reference target {target} of {resource}.{field} must have a single-field key")]
    CompositeReferenceTarget {
        resource: String,
        field: String,
        target: String,
    },
    #[error("key of {0} refers back to itself through references")]
    KeyReferenceLoop(String),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("invalid default for {resource}.{field}: {reason}")]
    InvalidDefault {
        resource: String,
        field: String,
        reason: String,
    },
    #[error("config load: {0}")]
    Load(String),
}

/// Phase of a driver interaction that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Transaction,
    Prepare,
    Execute,
    Convert,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Connect => "connect",
            Phase::Transaction => "transaction",
            Phase::Prepare => "prepare",
            Phase::Execute => "execute",
            Phase::Convert => "convert",
        })
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("metadata not found: {0}")]
    MetadataNotFound(String),
    #[error("unsupported data type {data_type} for column {field}")]
    UnsupportedDataType { field: String, data_type: String },
    #[error("unsupported field type: {0} is a collection relationship")]
    UnsupportedFieldType(String),
    #[error("invalid field shape: {0} is a relationship, not a column")]
    InvalidFieldShape(String),
    #[error("unknown field: {resource}.{field}")]
    UnknownField { resource: String, field: String },
    #[error("{0} update requested without key value")]
    MissingKeyForUpdate(String),
    #[error("generated key not found while inserting new record for {0}")]
    GeneratedKeyMissing(String),
    #[error("{operation} on {resource} affected {affected} rows, expected 1")]
    AffectedRowMismatch {
        operation: &'static str,
        resource: String,
        affected: u64,
    },
    #[error("cursor exhausted")]
    CursorExhausted,
    #[error("cursor has not been advanced to a row")]
    CursorNotStarted,
    #[error("engine closed")]
    EngineClosed,
    #[error("cyclic reference detected at {0}")]
    CyclicReferenceDetected(String),
    #[error("key for {resource} has {got} parts, expected {expected}")]
    KeyArity {
        resource: String,
        expected: usize,
        got: usize,
    },
    #[error("cannot convert {value} for {field}: expected {expected}")]
    Conversion {
        field: String,
        expected: &'static str,
        value: String,
    },
    #[error("{phase} failed for `{sql}`: {source}")]
    Driver {
        phase: Phase,
        sql: String,
        #[source]
        source: sqlx::Error,
    },
}

impl StoreError {
    /// Wraps a driver error with the statement text and phase, for use in `map_err`.
    pub(crate) fn driver(phase: Phase, sql: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
        move |source| StoreError::Driver {
            phase,
            sql: sql.to_string(),
            source,
        }
    }

    pub(crate) fn conversion(field: &str, expected: &'static str, value: impl fmt::Debug) -> Self {
        StoreError::Conversion {
            field: field.to_string(),
            expected,
            value: format!("{:?}", value),
        }
    }
}
