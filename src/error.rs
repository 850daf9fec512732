//! Error types for the todo API.

/// Top-level error type for the service process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Domain errors minted by the todo service.
///
/// Callers branch on the variant, never on the message text.
#[derive(Debug, thiserror::Error)]
pub enum TodoError {
    #[error("title is required")]
    TitleRequired,

    #[error("todo with this title already exists")]
    TitleExists,

    #[error("todo not found")]
    NotFound,

    #[error("failed to check title uniqueness: {0}")]
    UniquenessCheck(#[source] DatabaseError),

    #[error(transparent)]
    Storage(DatabaseError),
}

impl From<DatabaseError> for TodoError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { .. } => TodoError::NotFound,
            other => TodoError::Storage(other),
        }
    }
}

/// Result type alias for the service process.
pub type Result<T> = std::result::Result<T, Error>;
