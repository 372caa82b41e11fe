//! The [`Runner`]: binds the listener and spawns request serving on the
//! service runtime.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{listener, router, state::AppState};
use crate::error::InitializationError;
use crate::jsonrpc::JsonDecoder;
use crate::keygen::ProviderHandle;
use crate::tls::ListenerOptions;

/// File written under the data path advertising the bound port.
pub const PORTS_FILE: &str = "accountgenerator.ports";

/// Everything the transport needs to serve requests.
#[derive(Debug)]
pub struct Runner {
    provider: Arc<ProviderHandle>,
    options: ListenerOptions,
    decoder: JsonDecoder,
    data_path: PathBuf,
    runtime: Handle,
}

impl Runner {
    pub fn new(
        provider: Arc<ProviderHandle>,
        options: ListenerOptions,
        decoder: JsonDecoder,
        data_path: impl Into<PathBuf>,
        runtime: Handle,
    ) -> Self {
        Self {
            provider,
            options,
            decoder,
            data_path: data_path.into(),
            runtime,
        }
    }

    /// Bind the listener, publish the bound port and spawn the accept loop.
    ///
    /// # Errors
    ///
    /// [`InitializationError::Bind`] if the listener cannot be bound and
    /// [`InitializationError::DataPath`] if the ports file cannot be written.
    pub fn start(self) -> Result<RunningServer, InitializationError> {
        let _guard = self.runtime.enter();

        let requested = format!("{}:{}", self.options.host, self.options.port);
        let listener = listener::bind(&self.options)
            .map_err(|e| InitializationError::bind(&requested, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| InitializationError::bind(&requested, e))?;

        write_ports_file(&self.data_path, local_addr.port())?;

        let tls = self
            .options
            .tls()
            .map(|posture| TlsAcceptor::from(posture.server_config()));
        let router = router::build(AppState::new(self.provider, self.decoder));
        let shutdown = CancellationToken::new();
        let task = self.runtime.spawn(listener::serve(
            listener,
            router,
            tls,
            shutdown.clone(),
        ));

        info!(
            addr = %local_addr,
            ssl_enabled = self.options.ssl_enabled(),
            client_auth_required = self.options.client_auth().is_required(),
            "json-rpc service listening"
        );

        Ok(RunningServer {
            local_addr,
            shutdown,
            task,
        })
    }
}

fn write_ports_file(data_path: &Path, port: u16) -> Result<(), InitializationError> {
    let path = data_path.join(PORTS_FILE);
    fs::create_dir_all(data_path)
        .and_then(|()| fs::write(&path, format!("http-jsonrpc={port}\n")))
        .map_err(|source| InitializationError::DataPath { path, source })
}

/// A listener whose accept loop is running on the service runtime.
#[derive(Debug)]
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and ask open connections to drain. Returns the accept
    /// loop's join handle.
    pub fn shutdown(self) -> JoinHandle<()> {
        self.shutdown.cancel();
        self.task
    }
}
