//! Error types for dialect operations.

/// Boxed driver error, used for backends whose error types are not named here.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse classification of a [`DialectError`].
///
/// Callers branch on this instead of matching individual variants, so that
/// the identity of "transactions not supported" or "no valid transaction"
/// stays stable across component boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad data source, unreachable host, authentication or driver failure.
    Connection,
    /// Caller protocol violation around transaction boundaries.
    TransactionState,
    /// The backend has no transactions at all. Expected, not retryable.
    TransactionUnsupported,
    /// A native type with no column type on this backend.
    Classification,
    /// A schema introspection query failed.
    Probe,
    /// Dropping an index failed.
    IndexRemoval,
    /// Misuse of a result cursor or row.
    Cursor,
    /// A statement and its arguments do not fit together.
    Statement,
}

/// Errors that can occur while talking to a backend through a dialect.
#[derive(Debug, thiserror::Error)]
pub enum DialectError {
    /// The data source descriptor is missing required keys.
    #[error("invalid data source: {0}")]
    InvalidDsn(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Error from a relational driver, surfaced verbatim.
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// Error from the distributed-store driver, surfaced verbatim.
    #[error(transparent)]
    Cql(BoxError),

    /// The dialect has not been connected, or has already been closed.
    #[error("dialect is not connected")]
    NotConnected,

    /// `connect` was called on a dialect that is already connected.
    #[error("dialect is already connected")]
    AlreadyConnected,

    /// `connect` was called on a dialect that has been closed.
    #[error("dialect has been closed")]
    ConnectionClosed,

    /// The backend still reports an open session after close.
    #[error("close failed: {0} was not actually closed")]
    CloseFailed(&'static str),

    /// The backend has no multi-statement unit of work.
    #[error("transactions not supported")]
    TransactionNotSupported,

    /// A transaction could not be started.
    #[error("cannot start transaction")]
    CantStartTransaction(#[source] Option<sqlx::Error>),

    /// Commit or rollback without a matching begin.
    #[error("no valid transaction")]
    NoValidTransaction,

    /// A native type that this backend cannot store.
    #[error("invalid sql type {type_name} ({kind}) for {dialect}")]
    UnsupportedType {
        /// Dialect that rejected the type.
        dialect: &'static str,
        /// Kind of the offending type.
        kind: &'static str,
        /// Name of the offending type.
        type_name: String,
    },

    /// A schema probe query failed; the answer is unknown.
    #[error("schema probe {probe} failed: {source}")]
    ProbeFailed {
        /// Probe that failed (`has_table`, `has_column`, `has_index`).
        probe: &'static str,
        /// Underlying error.
        #[source]
        source: Box<DialectError>,
    },

    /// Dropping an index failed.
    #[error("failed to remove index {index}: {source}")]
    IndexRemoval {
        /// Index name.
        index: String,
        /// Underlying error.
        #[source]
        source: Box<DialectError>,
    },

    /// The number of bound arguments differs from the statement's markers.
    #[error("statement expects {expected} arguments, got {given}")]
    ArgumentCount {
        /// Bind markers in the statement.
        expected: usize,
        /// Arguments supplied.
        given: usize,
    },

    /// `Row::scan` on a query that returned nothing.
    #[error("no rows in result set")]
    NoRows,

    /// A column value could not be converted to the requested type.
    #[error("cannot decode column {column}: {message}")]
    Decode {
        /// Column index.
        column: usize,
        /// What went wrong.
        message: String,
    },

    /// The cursor has been closed.
    #[error("rows are closed")]
    Closed,
}

impl DialectError {
    /// Wraps a distributed-store driver error.
    pub fn cql(err: impl Into<BoxError>) -> Self {
        Self::Cql(err.into())
    }

    /// Creates a decode error for the given column.
    pub fn decode(column: usize, message: impl Into<String>) -> Self {
        Self::Decode {
            column,
            message: message.into(),
        }
    }

    pub(crate) fn probe(probe: &'static str, source: Self) -> Self {
        Self::ProbeFailed {
            probe,
            source: Box::new(source),
        }
    }

    pub(crate) fn index_removal(index: impl Into<String>, source: Self) -> Self {
        Self::IndexRemoval {
            index: index.into(),
            source: Box::new(source),
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDsn(_)
            | Self::Config(_)
            | Self::Database(_)
            | Self::Cql(_)
            | Self::NotConnected
            | Self::AlreadyConnected
            | Self::ConnectionClosed
            | Self::CloseFailed(_) => ErrorKind::Connection,
            Self::TransactionNotSupported => ErrorKind::TransactionUnsupported,
            Self::CantStartTransaction(_) | Self::NoValidTransaction => {
                ErrorKind::TransactionState
            }
            Self::UnsupportedType { .. } => ErrorKind::Classification,
            Self::ProbeFailed { .. } => ErrorKind::Probe,
            Self::IndexRemoval { .. } => ErrorKind::IndexRemoval,
            Self::NoRows | Self::Decode { .. } | Self::Closed => ErrorKind::Cursor,
            Self::ArgumentCount { .. } => ErrorKind::Statement,
        }
    }

    /// Returns whether the error marks a programming mistake that must abort
    /// the surrounding operation rather than be handled.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Classification)
    }
}

/// Result type for dialect operations.
pub type Result<T> = std::result::Result<T, DialectError>;
