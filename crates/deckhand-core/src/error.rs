//! Error types module
//!
//! All errors in the backup subsystem are unified under the `AppError`
//! enum. Per-database dump failures are deliberately *not* represented
//! here as a fatal variant: dump drivers log and swallow their own
//! failures, and only orchestrator-level faults (staging, packing,
//! extraction) surface as errors to callers.

use std::io;

use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Dump error for {database}: {message}")]
    Dump { database: String, message: String },

    #[error("Pack error: {0}")]
    Pack(String),

    #[error("IO error: {0}")]
    Io(#[source] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Io(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::Validation(format!("UUID parsing error: {}", err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl AppError {
    /// Get the error type name for structured logging and event payloads
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Database(_) => "Database",
            AppError::Validation(_) => "Validation",
            AppError::NotFound(_) => "NotFound",
            AppError::Forbidden(_) => "Forbidden",
            AppError::Extraction(_) => "Extraction",
            AppError::Dump { .. } => "Dump",
            AppError::Pack(_) => "Pack",
            AppError::Io(_) => "Io",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Log level for this error
    pub fn log_level(&self) -> LogLevel {
        match self {
            AppError::Validation(_) | AppError::NotFound(_) | AppError::Forbidden(_) => {
                LogLevel::Debug
            }
            AppError::Dump { .. } => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }

    /// Client-facing message. Internal and database failures are masked so
    /// that no connection strings or stack detail leak into responses.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Io(_) => "Filesystem operation failed".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Get detailed error information including the source chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_names() {
        assert_eq!(AppError::Validation("x".into()).error_type(), "Validation");
        assert_eq!(AppError::NotFound("x".into()).error_type(), "NotFound");
        assert_eq!(AppError::Forbidden("x".into()).error_type(), "Forbidden");
        assert_eq!(AppError::Extraction("x".into()).error_type(), "Extraction");
        assert_eq!(
            AppError::Dump {
                database: "main".into(),
                message: "boom".into()
            }
            .error_type(),
            "Dump"
        );
        assert_eq!(AppError::Pack("x".into()).error_type(), "Pack");
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(
            AppError::Validation("bad".into()).log_level(),
            LogLevel::Debug
        );
        assert_eq!(
            AppError::Dump {
                database: "main".into(),
                message: "boom".into()
            }
            .log_level(),
            LogLevel::Warn
        );
        assert_eq!(AppError::Pack("boom".into()).log_level(), LogLevel::Error);
    }

    #[test]
    fn test_client_message_masks_internal_detail() {
        let err = AppError::from(SqlxError::PoolClosed);
        assert_eq!(err.client_message(), "Failed to access database");

        let err = AppError::Internal("connection string postgres://u:p@host".into());
        assert_eq!(err.client_message(), "Internal server error");

        let err = AppError::NotFound("Backup not found".into());
        assert!(err.client_message().contains("Backup not found"));
    }

    #[test]
    fn test_detailed_message_includes_chain() {
        let source = anyhow::anyhow!("root cause").context("middle layer");
        let err = AppError::InternalWithSource {
            message: "outer".into(),
            source,
        };
        let details = err.detailed_message();
        assert!(details.contains("Caused by"));
    }
}
