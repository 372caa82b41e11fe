//! Common error types shared across crates.

use thiserror::Error;

/// Top-level request error type.
///
/// Variants map to JSON-RPC 2.0 error codes returned to callers
/// (see [`ServiceError::http_status`] for the accompanying HTTP status):
/// - [`ServiceError::Parse`] → -32700
/// - [`ServiceError::InvalidRequest`] → -32600
/// - [`ServiceError::MethodNotFound`] → -32601
/// - [`ServiceError::Unavailable`] → -32000
/// - [`ServiceError::Internal`] → -32603
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request body is not valid JSON.
    #[error("parse error: {0}")]
    Parse(String),

    /// The request body is valid JSON but not a well-formed JSON-RPC request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The requested method is not served by this service.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// The key generation backend is shut down or otherwise unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the JSON-RPC error code that should be sent for this error.
    pub fn json_rpc_code(&self) -> i64 {
        match self {
            ServiceError::Parse(_) => -32700,
            ServiceError::InvalidRequest(_) => -32600,
            ServiceError::MethodNotFound(_) => -32601,
            ServiceError::Unavailable(_) => -32000,
            ServiceError::Internal(_) => -32603,
        }
    }

    /// Returns the HTTP status code that should accompany this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::Parse(_) | ServiceError::InvalidRequest(_) => 400,
            ServiceError::MethodNotFound(_) => 404,
            ServiceError::Unavailable(_) => 503,
            ServiceError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_rpc_codes() {
        assert_eq!(ServiceError::Parse("x".into()).json_rpc_code(), -32700);
        assert_eq!(
            ServiceError::InvalidRequest("x".into()).json_rpc_code(),
            -32600
        );
        assert_eq!(
            ServiceError::MethodNotFound("x".into()).json_rpc_code(),
            -32601
        );
        assert_eq!(ServiceError::Unavailable("x".into()).json_rpc_code(), -32000);
        assert_eq!(ServiceError::Internal("x".into()).json_rpc_code(), -32603);
    }

    #[test]
    fn http_status_codes() {
        assert_eq!(ServiceError::Parse("x".into()).http_status(), 400);
        assert_eq!(ServiceError::InvalidRequest("x".into()).http_status(), 400);
        assert_eq!(ServiceError::MethodNotFound("x".into()).http_status(), 404);
        assert_eq!(ServiceError::Unavailable("x".into()).http_status(), 503);
        assert_eq!(ServiceError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn display_includes_message() {
        let e = ServiceError::MethodNotFound("eth_sendTransaction".into());
        assert!(e.to_string().contains("eth_sendTransaction"));
    }
}
