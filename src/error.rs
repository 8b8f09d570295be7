//! Error types for media-dl
//!
//! This module provides error handling for the library, including:
//! - Scheduler-facing errors (validation, admission control, lifecycle)
//! - Fetch engine errors captured into task records
//! - HTTP status code mapping for API integration

use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
///
/// This is the primary error type returned by the scheduler's public
/// operations. Each variant includes contextual information to help
/// diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed download request, rejected before any task state is created
    #[error("validation error: {message}")]
    Validation {
        /// Human-readable error message describing the invalid input
        message: String,
        /// The request field that caused the error (e.g., "url")
        field: Option<String>,
    },

    /// Admission control rejection — the pending queue is at capacity
    #[error("download queue is full (capacity {capacity})")]
    QueueFull {
        /// The configured queue capacity that was exceeded
        capacity: usize,
    },

    /// The queue has been shut down and no longer accepts work
    #[error("download queue is shut down")]
    QueueClosed,

    /// Operation referenced an unknown or removed task id
    #[error("task not found: {0}")]
    NotFound(String),

    /// A task with the same id already exists in the store
    #[error("duplicate task id: {0}")]
    DuplicateId(String),

    /// Fetch engine error
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// `start()` was called while the scheduler is already running
    #[error("scheduler is already running")]
    AlreadyRunning,

    /// Operation requires a running scheduler
    #[error("scheduler is not running")]
    NotRunning,

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a validation error without field context
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error attributed to a specific request field
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

/// Errors produced by the external fetch engine
///
/// These are captured verbatim into `TaskRecord.error` when a task fails;
/// they never propagate out of the worker loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Media cannot be fetched (private, removed, copyright-blocked)
    #[error("media unavailable: {0}")]
    Unavailable(String),

    /// Transient network failure
    #[error("network error: {0}")]
    Network(String),

    /// Resolved media exceeds the configured size limit
    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Size reported by the engine in bytes
        size: u64,
        /// Configured maximum in bytes
        limit: u64,
    },

    /// Resolved media exceeds the configured duration limit
    #[error("media too long: {duration}s exceeds limit of {limit}s")]
    TooLong {
        /// Duration reported by the engine in seconds
        duration: u64,
        /// Configured maximum in seconds
        limit: u64,
    },

    /// The engine observed the cancellation signal and aborted
    #[error("download cancelled")]
    Cancelled,

    /// Any other engine-reported failure
    #[error("{0}")]
    Engine(String),
}

/// Convert errors to HTTP status codes for API responses
///
/// This trait maps domain errors to appropriate HTTP status codes for the
/// embedding HTTP layer.
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Validation { .. } => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,

            // 409 Conflict - Resource or lifecycle state conflict
            Error::DuplicateId(_) => 409,
            Error::AlreadyRunning => 409,
            Error::NotRunning => 409,

            // 429 Too Many Requests - Admission control
            Error::QueueFull { .. } => 429,

            // 500 Internal Server Error - Server-side issues
            Error::Io(_) => 500,

            // Fetch errors map per the inner variant
            Error::Fetch(e) => e.status_code(),

            // 503 Service Unavailable
            Error::QueueClosed => 503,
            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Validation { .. } => "validation_error",
            Error::QueueFull { .. } => "queue_full",
            Error::QueueClosed => "queue_closed",
            Error::NotFound(_) => "not_found",
            Error::DuplicateId(_) => "duplicate_id",
            Error::Fetch(e) => e.error_code(),
            Error::AlreadyRunning => "already_running",
            Error::NotRunning => "not_running",
            Error::ShuttingDown => "shutting_down",
            Error::Io(_) => "io_error",
        }
    }
}

impl ToHttpStatus for FetchError {
    fn status_code(&self) -> u16 {
        match self {
            // 403 Forbidden - private/removed/DRM media
            FetchError::Unavailable(_) => 403,

            // 502 Bad Gateway - upstream failures
            FetchError::Network(_) => 502,
            FetchError::Engine(_) => 502,

            // 422 Unprocessable Entity - semantic limits
            FetchError::TooLarge { .. } => 422,
            FetchError::TooLong { .. } => 422,

            // 409 Conflict - the task was cancelled underneath the request
            FetchError::Cancelled => 409,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            FetchError::Unavailable(_) => "media_unavailable",
            FetchError::Network(_) => "network_error",
            FetchError::TooLarge { .. } => "file_too_large",
            FetchError::TooLong { .. } => "media_too_long",
            FetchError::Cancelled => "cancelled",
            FetchError::Engine(_) => "engine_error",
        }
    }
}
