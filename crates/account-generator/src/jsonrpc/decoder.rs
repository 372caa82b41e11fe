//! The service's single JSON decoder.
//!
//! Decoding is strict and not configurable: a required field (any field not
//! declared as `Option`) must be present and must not be `null`. There is no
//! silent default substitution.

use serde::de::DeserializeOwned;
use serde_json::error::Category;
use thiserror::Error;

use common::ServiceError;

/// Errors produced while decoding a request body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The body is not well-formed JSON.
    #[error("malformed JSON at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// The body is JSON but does not match the expected shape.
    #[error("invalid payload at line {line}, column {column}: {message}")]
    Shape {
        line: usize,
        column: usize,
        message: String,
    },
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        let (line, column, message) = (e.line(), e.column(), e.to_string());
        match e.classify() {
            Category::Data => DecodeError::Shape {
                line,
                column,
                message,
            },
            Category::Syntax | Category::Eof | Category::Io => DecodeError::Syntax {
                line,
                column,
                message,
            },
        }
    }
}

impl From<DecodeError> for ServiceError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Syntax { .. } => ServiceError::Parse(e.to_string()),
            DecodeError::Shape { .. } => ServiceError::InvalidRequest(e.to_string()),
        }
    }
}

/// Strict JSON decoder shared by every request handler.
#[derive(Debug, Clone, Copy)]
pub struct JsonDecoder;

impl JsonDecoder {
    /// The decoder configuration used throughout the service.
    pub fn strict() -> Self {
        JsonDecoder
    }

    /// Decode `bytes` into `T`.
    ///
    /// # Errors
    ///
    /// [`DecodeError::Syntax`] for malformed JSON, [`DecodeError::Shape`] for
    /// missing or `null` required fields and type mismatches.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::protocol::{JsonRpcId, JsonRpcRequest};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Transfer {
        to: String,
        amount: u64,
        memo: Option<String>,
    }

    #[test]
    fn accepts_payload_with_all_required_fields() {
        let decoded: Transfer = JsonDecoder::strict()
            .decode(br#"{"to": "0xabc", "amount": 5}"#)
            .unwrap();
        assert_eq!(
            decoded,
            Transfer {
                to: "0xabc".into(),
                amount: 5,
                memo: None
            }
        );
    }

    #[test]
    fn rejects_missing_required_field() {
        let err = JsonDecoder::strict()
            .decode::<Transfer>(br#"{"to": "0xabc"}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Shape { ref message, .. } if message.contains("amount")));
    }

    #[test]
    fn rejects_null_required_field() {
        let err = JsonDecoder::strict()
            .decode::<Transfer>(br#"{"to": null, "amount": 5}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Shape { .. }));
    }

    #[test]
    fn malformed_json_is_a_syntax_error() {
        let err = JsonDecoder::strict()
            .decode::<Transfer>(br#"{"to": "#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Syntax { line: 1, .. }));
        assert_eq!(ServiceError::from(err).json_rpc_code(), -32700);
    }

    #[test]
    fn shape_errors_map_to_invalid_request() {
        let err = JsonDecoder::strict()
            .decode::<JsonRpcRequest>(br#"{"jsonrpc": "2.0", "id": 1}"#)
            .unwrap_err();
        assert_eq!(ServiceError::from(err).json_rpc_code(), -32600);
    }

    #[test]
    fn decodes_json_rpc_request() {
        let req: JsonRpcRequest = JsonDecoder::strict()
            .decode(br#"{"jsonrpc": "2.0", "method": "account_generate", "id": "a1"}"#)
            .unwrap();
        assert_eq!(req.method, "account_generate");
        assert_eq!(req.id, JsonRpcId::String("a1".into()));
    }
}
