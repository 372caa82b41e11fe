//! Axum middleware limits applied to the router.
//!
//! Includes request tracing, timeout enforcement, and a request body cap.

use std::time::Duration;

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest accepted request body. JSON-RPC requests here are tiny.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Upper bound on a TLS handshake before the connection is dropped.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
