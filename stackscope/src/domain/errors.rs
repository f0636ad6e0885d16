//! Structured error types for stackscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Per the absorption policy, none of these reach callers of the capture or
//! resolution APIs; they are logged and the result degrades instead.

use super::types::Tid;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SymbolError {
    #[error("symbol dump tool not found: {0}")]
    ToolMissing(String),

    #[error("symbol dump exited with code {code}")]
    ToolFailed { code: i32 },

    #[error("symbol dump produced no usable entries")]
    EmptyDump,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ThreadCaptureError {
    #[error("thread capture is not supported on this platform")]
    Unsupported,

    #[error("failed to signal thread {tid}: errno {errno}")]
    SignalFailed { tid: Tid, errno: i32 },

    #[error("thread {0} did not respond within {1:?}")]
    Timeout(Tid, Duration),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to serialize stack data: {0}")]
    SerializationFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_capture_error_display() {
        let err = ThreadCaptureError::SignalFailed { tid: Tid(99), errno: 3 };
        assert!(err.to_string().contains("99"));
        assert!(err.to_string().contains("errno 3"));
    }

    #[test]
    fn test_symbol_error_display() {
        let err = SymbolError::ToolMissing("nm".to_string());
        assert_eq!(err.to_string(), "symbol dump tool not found: nm");
    }
}
