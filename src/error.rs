//! Error codes shared by every service error enum.
//!
//! DESIGN
//! ======
//! Each service owns its own `thiserror` enum. Callers that surface errors
//! to an operator (CLI output, toasts) read a grepable code and a retryable
//! flag through this trait instead of matching on concrete variants.

/// Grepable error code and retryable flag for structured error reporting.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
