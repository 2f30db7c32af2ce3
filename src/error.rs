//! Error types for treeql.

use thiserror::Error;

/// Who is to blame for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The query text was malformed or did not fit the schema.
    Client,
    /// The schema, the compiler or the database let us down.
    Server,
}

/// The main error type for treeql operations.
#[derive(Debug, Error)]
pub enum TreeqlError {
    /// The query text could not be tokenized or parsed.
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    /// The query parsed but does not fit the schema.
    #[error("Invalid query: {0}")]
    Validation(String),

    /// The compiler met a relationship shape it cannot express.
    #[error("SQL generation failed: {0}")]
    Compile(String),

    /// The schema registry is inconsistent or could not be loaded.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TreeqlError {
    /// Create a syntax error at the given byte offset.
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a compilation error.
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Syntax { .. } | Self::Validation(_) => ErrorKind::Client,
            Self::Compile(_)
            | Self::Schema(_)
            | Self::Config(_)
            | Self::Database(_)
            | Self::Io(_) => ErrorKind::Server,
        }
    }

    /// HTTP status code a request boundary should answer with.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Client => 422,
            ErrorKind::Server => 500,
        }
    }
}

impl From<sqlx::Error> for TreeqlError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type alias for treeql operations.
pub type TreeqlResult<T> = Result<T, TreeqlError>;
