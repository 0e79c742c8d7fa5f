//! Structured error types for the Verisoul client
//!
//! Only a handful of failures ever reach the host application: the
//! `session()` wait timing out, the session-creation handshake failing, and a
//! bad environment string. Everything below those (transport, platform,
//! storage) is recovered locally and never crosses this boundary.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Boxed cause carried by the host-visible errors.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stable error kinds shared with the other platform SDKs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The browser engine used for the session handshake is missing or broken
    WebviewUnavailable,
    /// No session id could be produced within the time budget
    SessionUnavailable,
    /// The environment string does not name a known environment
    InvalidEnvironment,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::WebviewUnavailable => "WEBVIEW_UNAVAILABLE",
            ErrorCode::SessionUnavailable => "SESSION_UNAVAILABLE",
            ErrorCode::InvalidEnvironment => "INVALID_ENVIRONMENT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary error type for Verisoul operations
#[derive(Error, Debug)]
pub enum VerisoulError {
    // =========================================================================
    // Host-visible session errors
    // =========================================================================
    /// Session could not be produced (timeout, handshake exhausted its retries)
    #[error("SESSION_UNAVAILABLE: {message}")]
    SessionUnavailable {
        message: String,
        #[source]
        cause: Option<Cause>,
    },

    /// Handshake host missing or unusable
    #[error("WEBVIEW_UNAVAILABLE: {message}")]
    WebviewUnavailable {
        message: String,
        #[source]
        cause: Option<Cause>,
    },

    /// Unknown environment string
    #[error("INVALID_ENVIRONMENT: Unknown environment: {value}")]
    InvalidEnvironment { value: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Config file could not be read or parsed
    #[error("failed to load configuration from {path}: {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    // =========================================================================
    // External Error Wrappers
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),
}

impl VerisoulError {
    pub fn session_unavailable(message: impl Into<String>) -> Self {
        Self::SessionUnavailable {
            message: message.into(),
            cause: None,
        }
    }

    pub fn webview_unavailable(message: impl Into<String>) -> Self {
        Self::WebviewUnavailable {
            message: message.into(),
            cause: None,
        }
    }

    /// Timeout of the bounded `session()` wait
    pub fn session_timeout(budget: Duration) -> Self {
        Self::session_unavailable(format!(
            "Session ID retrieval timed out after {} seconds",
            budget.as_secs_f64()
        ))
    }

    /// Attach an underlying cause to a host-visible error
    pub fn with_cause(self, cause: impl Into<Cause>) -> Self {
        match self {
            Self::SessionUnavailable { message, .. } => Self::SessionUnavailable {
                message,
                cause: Some(cause.into()),
            },
            Self::WebviewUnavailable { message, .. } => Self::WebviewUnavailable {
                message,
                cause: Some(cause.into()),
            },
            other => other,
        }
    }

    /// Stable error kind, if this error is one the host is expected to branch on
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::SessionUnavailable { .. } => Some(ErrorCode::SessionUnavailable),
            Self::WebviewUnavailable { .. } => Some(ErrorCode::WebviewUnavailable),
            Self::InvalidEnvironment { .. } => Some(ErrorCode::InvalidEnvironment),
            _ => None,
        }
    }

    /// Whether calling `session()` again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SessionUnavailable { .. } | Self::WebviewUnavailable { .. } => true,
            Self::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            Self::InvalidEnvironment { .. }
            | Self::InvalidConfig { .. }
            | Self::ConfigLoad { .. }
            | Self::Json(_) => false,
        }
    }

    /// Message without the code prefix
    pub fn user_message(&self) -> String {
        match self {
            Self::SessionUnavailable { message, .. } | Self::WebviewUnavailable { message, .. } => {
                message.clone()
            }
            Self::InvalidEnvironment { value } => format!("Unknown environment: {}", value),
            _ => self.to_string(),
        }
    }
}

impl From<serde_json::Error> for VerisoulError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias using VerisoulError
pub type Result<T> = std::result::Result<T, VerisoulError>;
