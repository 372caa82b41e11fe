//! The running service as seen by the process entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};
use tracing::{info, warn};

use super::{signals, LifecycleState};
use crate::keygen::ProviderHandle;
use crate::server::RunningServer;

/// Upper bound on draining the accept loop, and then the runtime, at stop.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Owns the runtime, the accept loop and the backend of a started service.
///
/// [`ServiceHandle::stop`] tears everything down; dropping the handle does the
/// same. Both block the calling thread while connections drain. Inside an
/// async context they cancel the accept loop without waiting and shut the
/// runtime down in the background instead.
#[derive(Debug)]
pub struct ServiceHandle {
    runtime: Option<Runtime>,
    server: Option<RunningServer>,
    provider: Arc<ProviderHandle>,
    local_addr: SocketAddr,
    ssl_enabled: bool,
    state: LifecycleState,
}

impl ServiceHandle {
    pub(super) fn new(
        runtime: Runtime,
        server: RunningServer,
        provider: Arc<ProviderHandle>,
        ssl_enabled: bool,
    ) -> Self {
        Self {
            local_addr: server.local_addr(),
            runtime: Some(runtime),
            server: Some(server),
            provider,
            ssl_enabled,
            state: LifecycleState::Listening,
        }
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn ssl_enabled(&self) -> bool {
        self.ssl_enabled
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Block until SIGINT or SIGTERM is received.
    pub fn wait_for_shutdown_signal(&self) {
        if let Some(runtime) = &self.runtime {
            runtime.block_on(signals::shutdown_signal());
        }
    }

    /// Stop serving, release the backend and shut the runtime down.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.state == LifecycleState::Stopped {
            return;
        }
        self.state.advance(LifecycleState::ShuttingDown);

        if Handle::try_current().is_ok() {
            // Blocking here would panic; cancel and let the runtime wind down.
            if let Some(server) = self.server.take() {
                drop(server.shutdown());
            }
            self.provider.release();
            if let Some(runtime) = self.runtime.take() {
                runtime.shutdown_background();
            }
            self.state.advance(LifecycleState::Stopped);
            info!("account generator stopped without draining connections");
            return;
        }

        if let (Some(runtime), Some(server)) = (&self.runtime, self.server.take()) {
            let accept_loop = server.shutdown();
            let drained =
                runtime.block_on(async { tokio::time::timeout(SHUTDOWN_GRACE, accept_loop).await });
            match drained {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "accept loop terminated abnormally"),
                Err(_) => warn!(
                    grace_secs = SHUTDOWN_GRACE.as_secs(),
                    "accept loop did not drain in time"
                ),
            }
        }

        self.provider.release();

        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
        }

        self.state.advance(LifecycleState::Stopped);
        info!("account generator stopped");
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
