//! Axum request handlers for all service endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use common::protocol::{
    GeneratedAccountResult, JsonRpcId, JsonRpcRequest, JsonRpcResponse, JSON_RPC_VERSION,
};
use common::ServiceError;
use tracing::{debug, warn};

use super::state::AppState;
use crate::keygen::KeyGenError;

/// JSON-RPC method that creates a new account through the backend.
pub const GENERATE_ACCOUNT_METHOD: &str = "account_generate";

/// Body returned by the liveness check.
pub const UPCHECK_BODY: &str = "I'm up!";

/// `GET /upcheck`: liveness check.
pub async fn upcheck() -> &'static str {
    UPCHECK_BODY
}

/// `POST /`: JSON-RPC 2.0 endpoint.
///
/// The body is decoded with the strict decoder, so requests missing `jsonrpc`,
/// `method` or `id` (or carrying `null` for them) are rejected with `-32600`.
pub async fn json_rpc(State(state): State<AppState>, body: Bytes) -> Response {
    let request: JsonRpcRequest = match state.decoder.decode(&body) {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "rejected JSON-RPC payload");
            return failure(None, ServiceError::from(e));
        }
    };

    if request.jsonrpc != JSON_RPC_VERSION {
        let err = ServiceError::InvalidRequest(format!(
            "unsupported jsonrpc version {:?}",
            request.jsonrpc
        ));
        return failure(Some(request.id), err);
    }

    match request.method.as_str() {
        GENERATE_ACCOUNT_METHOD => generate_account(&state, request.id).await,
        other => failure(Some(request.id), ServiceError::MethodNotFound(other.to_owned())),
    }
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "the requested resource does not exist")
}

async fn generate_account(state: &AppState, id: JsonRpcId) -> Response {
    let generator = state.provider.generator();
    let generated = match tokio::task::spawn_blocking(move || generator.generate()).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "key generation task failed");
            return failure(Some(id), ServiceError::Internal("key generation failed".into()));
        }
    };

    match generated {
        Ok(account) => {
            let result = GeneratedAccountResult {
                account_id: account.id,
                key_location: account.key_location.display().to_string(),
            };
            match serde_json::to_value(result) {
                Ok(value) => (StatusCode::OK, Json(JsonRpcResponse::success(id, value))).into_response(),
                Err(e) => failure(Some(id), ServiceError::Internal(e.to_string())),
            }
        }
        Err(KeyGenError::ShutDown) => failure(
            Some(id),
            ServiceError::Unavailable("key generator is shutting down".into()),
        ),
        Err(e) => {
            warn!(error = %e, "key generation failed");
            failure(Some(id), ServiceError::Internal("key generation failed".into()))
        }
    }
}

fn failure(id: Option<JsonRpcId>, err: ServiceError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(JsonRpcResponse::failure(id, &err))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        routing::{get, post},
        Router,
    };
    use axum_test::TestServer;
    use serde_json::{json, Value};

    use crate::jsonrpc::JsonDecoder;
    use crate::keygen::{
        GeneratedAccount, KeyGenerator, MockKeyGenerator, MockKeyGeneratorProvider,
        ProviderHandle,
    };

    fn provider_with(generator: MockKeyGenerator) -> Arc<ProviderHandle> {
        let generator: Arc<dyn KeyGenerator> = Arc::new(generator);
        let mut provider = MockKeyGeneratorProvider::new();
        provider
            .expect_generator()
            .returning(move || Arc::clone(&generator));
        provider.expect_shutdown().return_const(());
        Arc::new(ProviderHandle::new(Arc::new(provider)))
    }

    fn test_server(provider: Arc<ProviderHandle>) -> TestServer {
        let app = Router::new()
            .route("/upcheck", get(upcheck))
            .route("/", post(json_rpc))
            .with_state(AppState::new(provider, JsonDecoder::strict()));
        TestServer::new(app).unwrap()
    }

    fn generating() -> MockKeyGenerator {
        let mut generator = MockKeyGenerator::new();
        generator.expect_generate().returning(|| {
            Ok(GeneratedAccount {
                id: "0f8e".into(),
                key_location: "/data/0f8e.key".into(),
            })
        });
        generator
    }

    #[tokio::test]
    async fn upcheck_reports_up() {
        let server = test_server(provider_with(MockKeyGenerator::new()));
        let resp = server.get("/upcheck").await;
        resp.assert_status_ok();
        resp.assert_text(UPCHECK_BODY);
    }

    #[tokio::test]
    async fn generate_account_returns_backend_result() {
        let server = test_server(provider_with(generating()));
        let resp = server
            .post("/")
            .json(&json!({"jsonrpc": "2.0", "method": GENERATE_ACCOUNT_METHOD, "id": 1}))
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["id"], 1);
        assert_eq!(body["result"]["account_id"], "0f8e");
        assert_eq!(body["result"]["key_location"], "/data/0f8e.key");
    }

    #[tokio::test]
    async fn malformed_json_is_parse_error() {
        let server = test_server(provider_with(MockKeyGenerator::new()));
        let resp = server.post("/").text("{\"jsonrpc\": ").await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = resp.json();
        assert_eq!(body["error"]["code"], -32700);
        assert!(body["id"].is_null());
    }

    #[tokio::test]
    async fn missing_id_is_invalid_request() {
        let server = test_server(provider_with(MockKeyGenerator::new()));
        let resp = server
            .post("/")
            .json(&json!({"jsonrpc": "2.0", "method": GENERATE_ACCOUNT_METHOD}))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = resp.json();
        assert_eq!(body["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn null_method_is_invalid_request() {
        let server = test_server(provider_with(MockKeyGenerator::new()));
        let resp = server
            .post("/")
            .json(&json!({"jsonrpc": "2.0", "method": null, "id": 3}))
            .await;
        let body: Value = resp.json();
        assert_eq!(body["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn wrong_version_is_invalid_request() {
        let server = test_server(provider_with(MockKeyGenerator::new()));
        let resp = server
            .post("/")
            .json(&json!({"jsonrpc": "1.0", "method": GENERATE_ACCOUNT_METHOD, "id": 4}))
            .await;
        let body: Value = resp.json();
        assert_eq!(body["error"]["code"], -32600);
        assert_eq!(body["id"], 4);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let server = test_server(provider_with(MockKeyGenerator::new()));
        let resp = server
            .post("/")
            .json(&json!({"jsonrpc": "2.0", "method": "eth_sign", "id": "x"}))
            .await;
        resp.assert_status_not_found();
        let body: Value = resp.json();
        assert_eq!(body["error"]["code"], -32601);
        assert_eq!(body["id"], "x");
    }

    #[tokio::test]
    async fn shut_down_backend_is_unavailable() {
        let mut generator = MockKeyGenerator::new();
        generator
            .expect_generate()
            .returning(|| Err(KeyGenError::ShutDown));
        let server = test_server(provider_with(generator));
        let resp = server
            .post("/")
            .json(&json!({"jsonrpc": "2.0", "method": GENERATE_ACCOUNT_METHOD, "id": 5}))
            .await;
        resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = resp.json();
        assert_eq!(body["error"]["code"], -32000);
    }
}
