//! Error types for the render pipeline

use serde::Serialize;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while turning a request into a screenshot
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input encoding (bad base64, non UTF-8, empty markup)
    #[error("Failed to decode input: {0}")]
    DecodeError(String),

    /// Stylesheet failed to compile (recoverable)
    #[error("Stylesheet compilation failed: {0}")]
    StyleCompileError(String),

    /// Markup failed to compile
    #[error("Markup compilation failed at {line}:{column}: {message}")]
    MarkupCompileError {
        message: String,
        line: usize,
        column: usize,
    },

    /// No entry component could be located
    #[error("Entry component not found: {0}")]
    EntryPointNotFound(String),

    /// The local content server could not bind or start
    #[error("Content server failed to start: {0}")]
    ServerStartError(String),

    /// Navigation to the served document failed
    #[error("Navigation failed: {0}")]
    NavigationError(String),

    /// Waiting for readiness exceeded its deadline
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// The screenshot could not be captured or written
    #[error("Capture failed: {0}")]
    CaptureError(String),

    /// The request was cancelled
    #[error("Render cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CDP-specific error
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`], used for diagnostics tags and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    DecodeError,
    StyleCompileError,
    MarkupCompileError,
    EntryPointNotFound,
    ServerStartError,
    NavigationError,
    CaptureError,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DecodeError => "DecodeError",
            ErrorKind::StyleCompileError => "StyleCompileError",
            ErrorKind::MarkupCompileError => "MarkupCompileError",
            ErrorKind::EntryPointNotFound => "EntryPointNotFound",
            ErrorKind::ServerStartError => "ServerStartError",
            ErrorKind::NavigationError => "NavigationError",
            ErrorKind::CaptureError => "CaptureError",
            ErrorKind::Unexpected => "Unexpected",
        }
    }

    /// Process exit code for a pipeline that terminated with this kind.
    ///
    /// 1 means the input could not be compiled, 2 means rendering failed.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::DecodeError | ErrorKind::MarkupCompileError => 1,
            ErrorKind::StyleCompileError | ErrorKind::EntryPointNotFound => 0,
            ErrorKind::ServerStartError
            | ErrorKind::NavigationError
            | ErrorKind::CaptureError
            | ErrorKind::Unexpected => 2,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DecodeError(_) => ErrorKind::DecodeError,
            Error::StyleCompileError(_) => ErrorKind::StyleCompileError,
            Error::MarkupCompileError { .. } => ErrorKind::MarkupCompileError,
            Error::EntryPointNotFound(_) => ErrorKind::EntryPointNotFound,
            Error::ServerStartError(_) => ErrorKind::ServerStartError,
            Error::NavigationError(_) | Error::Timeout(_) => ErrorKind::NavigationError,
            Error::CaptureError(_) => ErrorKind::CaptureError,
            Error::Cancelled
            | Error::ConfigError(_)
            | Error::Io(_)
            | Error::CdpError(_)
            | Error::Other(_) => ErrorKind::Unexpected,
        }
    }

    /// Whether this error aborts the pipeline to the failure path.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::StyleCompileError(_) | Error::EntryPointNotFound(_)
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}
