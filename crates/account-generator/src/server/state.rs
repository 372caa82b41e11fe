//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::jsonrpc::JsonDecoder;
use crate::keygen::ProviderHandle;

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable so that Axum can clone the state for each
/// request without copying expensive data.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Key generation backend; released by the shutdown path.
    pub provider: Arc<ProviderHandle>,
    /// The service's strict JSON decoder.
    pub decoder: JsonDecoder,
}

impl AppState {
    pub fn new(provider: Arc<ProviderHandle>, decoder: JsonDecoder) -> Self {
        Self { provider, decoder }
    }
}
