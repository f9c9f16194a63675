use thiserror::Error;

/// Main error type for the log relay
#[derive(Debug, Error)]
pub enum RelayError {
    // Sink-related errors
    #[error("Failed to open sink {0}: {1}")]
    SinkInitError(String, String),

    #[error("Failed to write to sink: {0}")]
    SinkWriteError(String),

    #[error("Sink has been closed")]
    SinkClosed,

    #[error("Failed to close sink: {0}")]
    CloseError(String),

    // Relay lifecycle errors
    #[error("Relay has been closed")]
    RelayClosed,

    #[error("Failed to capture process output: {0}")]
    CaptureError(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
