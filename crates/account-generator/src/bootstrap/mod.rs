//! Service startup and lifecycle.
//!
//! [`ServiceBootstrap::start`] walks the lifecycle strictly in order:
//!
//! 1. `Created → TlsConfigured`: resolve the listener's TLS posture.
//! 2. `TlsConfigured → BackendReady`: build the multi-threaded runtime, then
//!    acquire the key generation backend from the caller's factory.
//! 3. `BackendReady → Listening`: bind the listener and spawn the accept loop.
//!
//! A failure at any step returns [`InitializationError`] after releasing what
//! the earlier steps acquired. The returned [`ServiceHandle`] drives
//! `Listening → ShuttingDown → Stopped`.

pub mod handle;
pub mod signals;

pub use handle::ServiceHandle;

use std::fmt;
use std::sync::Arc;

use tokio::runtime::{self, Runtime};
use tracing::info;

use crate::config::Config;
use crate::error::InitializationError;
use crate::jsonrpc::JsonDecoder;
use crate::keygen::{KeyGeneratorProvider, ProviderHandle};
use crate::server::Runner;
use crate::tls::{apply_tls_settings, ListenerOptions};

/// Stages a service passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Created,
    TlsConfigured,
    BackendReady,
    Listening,
    ShuttingDown,
    Stopped,
}

impl LifecycleState {
    fn advance(&mut self, next: LifecycleState) {
        debug_assert!(next > *self, "lifecycle moved backwards: {self} -> {next}");
        info!(from = %self, to = %next, "lifecycle transition");
        *self = next;
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::TlsConfigured => "tls_configured",
            LifecycleState::BackendReady => "backend_ready",
            LifecycleState::Listening => "listening",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Builds and starts the service from a validated [`Config`].
///
/// `factory` constructs the key generation backend. It runs inside the service
/// runtime's context, so it may spawn tasks onto it.
pub struct ServiceBootstrap<F> {
    config: Config,
    factory: F,
}

impl<F> ServiceBootstrap<F>
where
    F: FnOnce(&Config) -> anyhow::Result<Arc<dyn KeyGeneratorProvider>>,
{
    pub fn new(config: Config, factory: F) -> Self {
        Self { config, factory }
    }

    /// Start serving.
    ///
    /// # Errors
    ///
    /// Any TLS, runtime, backend or bind failure. Nothing started by this call
    /// outlives a failure.
    pub fn start(self) -> Result<ServiceHandle, InitializationError> {
        let Self { config, factory } = self;
        let mut state = LifecycleState::Created;

        let options = apply_tls_settings(
            &ListenerOptions::from_config(&config),
            config.tls.as_ref(),
        )?;
        state.advance(LifecycleState::TlsConfigured);

        let runtime = build_runtime()?;
        let provider = {
            let _guard = runtime.enter();
            factory(&config)
        };
        let provider = match provider {
            Ok(provider) => Arc::new(ProviderHandle::new(provider)),
            Err(e) => {
                runtime.shutdown_background();
                return Err(InitializationError::Backend(e));
            }
        };
        state.advance(LifecycleState::BackendReady);

        let ssl_enabled = options.ssl_enabled();
        let runner = Runner::new(
            Arc::clone(&provider),
            options,
            JsonDecoder::strict(),
            &config.data_path,
            runtime.handle().clone(),
        );
        let server = match runner.start() {
            Ok(server) => server,
            Err(e) => {
                provider.release();
                runtime.shutdown_background();
                return Err(e);
            }
        };
        state.advance(LifecycleState::Listening);

        Ok(ServiceHandle::new(runtime, server, provider, ssl_enabled))
    }
}

fn build_runtime() -> Result<Runtime, InitializationError> {
    runtime::Builder::new_multi_thread()
        .thread_name("accountgen-worker")
        .enable_all()
        .build()
        .map_err(InitializationError::Runtime)
}
