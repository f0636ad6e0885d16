//! Domain model for stackscope
//!
//! Core newtypes and structured errors:
//! - Compile-time safety via the newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

pub use errors::{ExportError, SymbolError, ThreadCaptureError};
pub use types::{CaptureScope, Pid, Tid};
