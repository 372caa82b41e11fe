//! `account-generator` binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from the optional file and the environment.
//! 2. Initialise structured logging, plus OTLP span export when configured.
//! 3. Start the service: TLS posture, runtime, file-backed key generator,
//!    JSON-RPC listener.
//! 4. Wait for SIGINT/SIGTERM, stop the service, then flush telemetry.

mod bootstrap;
mod config;
mod error;
mod jsonrpc;
mod keygen;
mod server;
mod telemetry;
mod tls;

#[cfg(test)]
mod testutil;

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use bootstrap::ServiceBootstrap;
use config::Config;
use keygen::{FileKeyGeneratorProvider, KeyGeneratorProvider};

fn main() -> ExitCode {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            // Logging is not yet up; write to stderr directly.
            eprintln!("ERROR: configuration invalid: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    let telemetry_guard = match telemetry::init_telemetry(&cfg.log_level, cfg.otlp_endpoint.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %cfg.http_listen_host,
        port = cfg.http_listen_port,
        "account generator starting"
    );

    // -----------------------------------------------------------------------
    // 3. Service
    // -----------------------------------------------------------------------
    let bootstrap = ServiceBootstrap::new(cfg, |cfg: &Config| {
        let provider = FileKeyGeneratorProvider::new(&cfg.data_path)?;
        Ok(Arc::new(provider) as Arc<dyn KeyGeneratorProvider>)
    });
    let service = match bootstrap.start() {
        Ok(service) => service,
        Err(e) => {
            let e = anyhow::Error::from(e);
            error!(error = %format!("{e:#}"), "account generator failed to start");
            telemetry_guard.shutdown();
            return ExitCode::FAILURE;
        }
    };
    info!(
        addr = %service.local_addr(),
        ssl_enabled = service.ssl_enabled(),
        state = %service.state(),
        "account generator ready"
    );

    // -----------------------------------------------------------------------
    // 4. Shutdown
    // -----------------------------------------------------------------------
    service.wait_for_shutdown_signal();
    info!("shutting down account generator");
    service.stop();
    telemetry_guard.shutdown();

    ExitCode::SUCCESS
}
