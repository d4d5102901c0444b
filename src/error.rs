/// Boxed error returned by function tasks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for contexts and tasks
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `initialize` was called on a context that already holds a transaction
    #[error("{context} is already initialized")]
    AlreadyInitialized { context: String },

    /// An operation needing a live transaction was issued without one
    #[error("{context} is not initialized")]
    NotInitialized { context: String },

    /// The context was committed or rolled back and cannot be reused
    #[error("{context} has been finalized and cannot be initialized again")]
    Finalized { context: String },

    /// The pool could not supply a connection
    #[error("Connection acquisition failed: {0}")]
    Acquisition(#[source] sqlx::Error),

    /// The driver rejected a statement
    #[error("Statement error: {0}")]
    Statement(#[source] sqlx::Error),

    /// A function task returned an error
    #[error("Function task failed: {0}")]
    FunctionTask(#[source] BoxError),

    /// Commit or rollback failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A named placeholder has no value in the parameter set
    #[error("Missing value for parameter `:{0}`")]
    MissingParameter(String),

    /// The task has already been executed
    #[error("Task has already been executed")]
    AlreadyExecuted,

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for context and task operations
pub type Result<T> = std::result::Result<T, Error>;
