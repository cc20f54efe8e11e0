//! Module-side error types.

/// Error returned by a module's initializer.
///
/// The host sees it as an error thrown inside the isolate.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// Key or string value contained an interior NUL byte.
    #[error("Invalid string for '{0}': contains a NUL byte")]
    InvalidString(String),

    /// The host rejected a JSON value.
    #[error("Host rejected JSON value for '{0}'")]
    InvalidJson(String),

    /// The scheduler loop no longer accepts callbacks.
    #[error("Isolate loop is closed")]
    LoopClosed,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Custom error.
    #[error("{0}")]
    Custom(String),
}

impl InitError {
    /// Build a custom error from any message.
    pub fn custom(message: impl Into<String>) -> Self {
        InitError::Custom(message.into())
    }
}

/// Result type for module initializers.
pub type InitResult<T> = std::result::Result<T, InitError>;
