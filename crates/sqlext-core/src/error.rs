//! Error types for sqlext operations.

use std::fmt;
use std::sync::Arc;

/// The primary error type for all sqlext operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (open, close, lost connection)
    Connection(ConnectionError),
    /// Query execution errors reported by the store
    Query(QueryError),
    /// Type conversion errors while reading rows
    Type(TypeError),
    /// Deferred batch errors (invalid state, failed round trip, failed projection)
    Batch(BatchError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the connection
    Connect,
    /// Failed to close the connection
    Close,
    /// Connection lost during operation
    Disconnected,
    /// Authentication failed
    Authentication,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Deadlock detected
    Deadlock,
    /// Serialization failure (retry may succeed)
    Serialization,
    /// Statement timeout
    Timeout,
    /// The store returned an unexpected response shape
    Protocol,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

/// Error raised by a deferred query batch or one of its handles.
///
/// `StoreExecution` errors are shared by every descriptor of the failed
/// round trip; the underlying store error is kept as `source`.
#[derive(Debug)]
pub struct BatchError {
    pub kind: BatchErrorKind,
    pub message: String,
    /// Descriptor index the error belongs to, if it is specific to one.
    pub index: Option<usize>,
    pub source: Option<Arc<Error>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchErrorKind {
    /// Mutating a frozen batch, or reading a discarded one
    InvalidState,
    /// The combined round trip failed; applies to every descriptor
    StoreExecution,
    /// A projector failed to convert its own result set
    Projection,
}

impl BatchError {
    /// Build an `InvalidState` error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self {
            kind: BatchErrorKind::InvalidState,
            message: message.into(),
            index: None,
            source: None,
        }
    }

    /// Build a `StoreExecution` error wrapping the shared store failure.
    pub fn store_execution(index: usize, source: Arc<Error>) -> Self {
        Self {
            kind: BatchErrorKind::StoreExecution,
            message: format!("batch round trip failed: {source}"),
            index: Some(index),
            source: Some(source),
        }
    }

    /// Build a `Projection` error for a single descriptor.
    pub fn projection(index: usize, source: Arc<Error>) -> Self {
        Self {
            kind: BatchErrorKind::Projection,
            message: format!("projection of result set {index} failed: {source}"),
            index: Some(index),
            source: Some(source),
        }
    }
}

impl Error {
    /// Is this a retryable error (deadlock, serialization, statement timeout)?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Query(q) => matches!(
                q.kind,
                QueryErrorKind::Deadlock | QueryErrorKind::Serialization | QueryErrorKind::Timeout
            ),
            Error::Batch(b) => b.source.as_deref().is_some_and(Error::is_retryable),
            _ => false,
        }
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(c) => matches!(
                c.kind,
                ConnectionErrorKind::Connect
                    | ConnectionErrorKind::Disconnected
                    | ConnectionErrorKind::Authentication
            ),
            Error::Batch(b) => b.source.as_deref().is_some_and(Error::is_connection_error),
            _ => false,
        }
    }

    /// Batch error kind, if this is a batch error.
    pub fn batch_kind(&self) -> Option<BatchErrorKind> {
        match self {
            Error::Batch(b) => Some(b.kind),
            _ => None,
        }
    }

    /// Get SQLSTATE if available (e.g., "23505" for unique violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            Error::Batch(b) => b.source.as_deref().and_then(Error::sqlstate),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            Error::Batch(b) => b.source.as_deref().and_then(Error::sql),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Batch(e) => write!(f, "Batch error: {}", e.message),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Batch(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<BatchError> for Error {
    fn from(err: BatchError) -> Self {
        Error::Batch(err)
    }
}

/// Result type alias for sqlext operations.
pub type Result<T> = std::result::Result<T, Error>;
