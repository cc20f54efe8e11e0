//! Error types for islet-core.

use std::path::PathBuf;

/// Errors raised by the isolate runtime and the native module layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A native module was constructed outside the default isolate.
    #[error("Native modules may only be instantiated from the default isolate")]
    Precheck,

    /// The dynamic library could not be opened.
    #[error("Failed to load module '{}': {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    /// The library exports neither entry point.
    #[error("Module '{}' is not islet compatible", path.display())]
    IncompatibleModule { path: PathBuf },

    /// The context handle does not refer to a live context.
    #[error("Context is no longer valid")]
    InvalidContext,

    /// The target isolate was disposed before the task could run.
    #[error("Target isolate has been disposed")]
    TargetDisposed,

    /// The module's initializer threw.
    #[error("Module initialization failed: {0}")]
    Initialization(String),

    /// The referenced object no longer exists.
    #[error("Reference is no longer valid")]
    InvalidReference,

    /// Host code panicked while running on an isolate thread.
    #[error("Isolate task panicked: {0}")]
    TaskPanicked(String),

    /// The isolate thread could not be started.
    #[error("Failed to spawn isolate thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result type for islet-core.
pub type Result<T> = std::result::Result<T, Error>;
