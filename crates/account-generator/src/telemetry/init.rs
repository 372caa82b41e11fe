//! Tracing subscriber initialisation, with an optional OTLP span exporter.

use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, Resource};
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SERVICE_NAME: &str = "account-generator";

/// Upper bound on the exporter runtime winding down after the final flush.
const EXPORTER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Keeps the span exporter alive. [`TelemetryGuard::shutdown`] (or dropping the
/// guard) flushes buffered spans.
#[derive(Debug)]
pub struct TelemetryGuard {
    exporter_runtime: Option<Runtime>,
}

impl TelemetryGuard {
    /// Flush pending spans and stop the exporter.
    pub fn shutdown(mut self) {
        self.flush();
    }

    fn flush(&mut self) {
        if let Some(runtime) = self.exporter_runtime.take() {
            opentelemetry::global::shutdown_tracer_provider();
            runtime.shutdown_timeout(EXPORTER_SHUTDOWN_GRACE);
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Initialise the global tracing subscriber.
///
/// Configures:
/// - A JSON-formatted [`tracing_subscriber`] layer for structured log output.
/// - When `otlp_endpoint` is set, a [`tracing_opentelemetry`] layer exporting
///   spans over OTLP/gRPC. The batch exporter runs on a small runtime of its
///   own, since the service runtime does not exist yet at this point.
///
/// # Errors
///
/// Returns an error if `log_level` is not a valid filter directive, the OTLP
/// pipeline cannot be installed, or a global subscriber is already installed.
pub fn init_telemetry(log_level: &str, otlp_endpoint: Option<&str>) -> Result<TelemetryGuard> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level {log_level:?}"))?,
    };

    let (otel_layer, exporter_runtime) = match otlp_endpoint {
        Some(endpoint) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("accountgen-otlp")
                .enable_all()
                .build()
                .context("failed to start OTLP exporter runtime")?;
            let tracer = {
                let _guard = runtime.enter();
                install_otlp_pipeline(endpoint)?
            };
            (
                Some(tracing_opentelemetry::layer().with_tracer(tracer)),
                Some(runtime),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .with(otel_layer)
        .try_init()
        .context("failed to initialise tracing subscriber")?;

    if let Some(endpoint) = otlp_endpoint {
        info!(otlp_endpoint = endpoint, "exporting spans over OTLP");
    }

    Ok(TelemetryGuard { exporter_runtime })
}

fn install_otlp_pipeline(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default().with_resource(service_resource()),
        )
        .install_batch(runtime::Tokio)
        .context("failed to install OTLP tracing pipeline")
}

fn service_resource() -> Resource {
    Resource::new(vec![
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
            SERVICE_NAME,
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
            env!("CARGO_PKG_VERSION"),
        ),
    ])
}
