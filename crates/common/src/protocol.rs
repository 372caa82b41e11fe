//! JSON-RPC 2.0 request and response types exchanged with clients.
//!
//! Requests are decoded with the service's strict decoder: every field that is
//! not an `Option` must be present and non-null, and unknown fields are rejected.

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// The only protocol version accepted in the `jsonrpc` member.
pub const JSON_RPC_VERSION: &str = "2.0";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Identifier echoed back in the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(i64),
    String(String),
}

/// Request body for `POST /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonRpcRequest {
    /// Protocol version, must equal [`JSON_RPC_VERSION`].
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Method parameters. Optional; unused by the methods served today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Request id. Notifications (requests without an id) are not supported.
    pub id: JsonRpcId,
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Error member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl From<&ServiceError> for JsonRpcError {
    fn from(err: &ServiceError) -> Self {
        Self {
            code: err.json_rpc_code(),
            message: err.to_string(),
        }
    }
}

/// Response body for `POST /`. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    /// `null` when the request id could not be determined (parse errors).
    pub id: Option<JsonRpcId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Construct a success response.
    pub fn success(id: JsonRpcId, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.into(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Construct an error response from a [`ServiceError`].
    pub fn failure(id: Option<JsonRpcId>, err: &ServiceError) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.into(),
            id,
            result: None,
            error: Some(err.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Method results
// ---------------------------------------------------------------------------

/// Result of `account_generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedAccountResult {
    /// Identifier assigned to the new account by the backend.
    pub account_id: String,
    /// Where the backend persisted the generated key material.
    pub key_location: String,
}
