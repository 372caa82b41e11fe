//! Configuration loading and validation for the account generator service.
//!
//! Values come from an optional TOML file named by `ACCOUNTGEN_CONFIG_FILE`,
//! overridden by `ACCOUNTGEN_*` environment variables. Nested keys use `__`,
//! e.g. `ACCOUNTGEN_TLS__KEY_STORE_FILE`. The process exits with a clear error
//! if any required value is missing or invalid.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable prefix for every configuration key.
const ENV_PREFIX: &str = "ACCOUNTGEN";

/// Environment variable naming an optional TOML configuration file.
const CONFIG_FILE_VAR: &str = "ACCOUNTGEN_CONFIG_FILE";

/// Validated service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Interface the HTTP listener binds to.
    #[serde(default = "default_http_listen_host")]
    pub http_listen_host: String,

    /// Port the HTTP listener binds to. `0` picks an ephemeral port.
    #[serde(default = "default_http_listen_port")]
    pub http_listen_port: u16,

    /// Directory the key generation backend writes into. **Required.**
    pub data_path: PathBuf,

    /// TLS settings. When absent the listener serves plain HTTP.
    #[serde(default)]
    pub tls: Option<TlsOptions>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP/gRPC collector endpoint (e.g. `http://127.0.0.1:4317`). Spans are
    /// exported only when set.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

/// Server identity and optional client authentication.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TlsOptions {
    /// PEM bundle holding the certificate chain and private key.
    pub key_store_file: PathBuf,
    /// File whose first line is the keystore password.
    pub key_store_password_file: PathBuf,
    /// Presence of this section makes client certificates mandatory.
    #[serde(default)]
    pub client_auth: Option<ClientAuthConstraints>,
}

/// Which client certificates are accepted once mutual TLS is on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientAuthConstraints {
    /// File of accepted client certificate fingerprints.
    #[serde(default)]
    pub known_clients_file: Option<PathBuf>,
    /// Accept any client whose certificate chains to a trusted CA.
    #[serde(default)]
    pub ca_authorized_client_allowed: bool,
    /// PEM bundle of CAs trusted for CA-authorized clients. Defaults to the
    /// Mozilla root set.
    #[serde(default)]
    pub ca_certificates_file: Option<PathBuf>,
}

fn default_http_listen_host() -> String {
    "127.0.0.1".into()
}
fn default_http_listen_port() -> u16 {
    8545
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from the optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if any required value is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let file = std::env::var_os(CONFIG_FILE_VAR).map(PathBuf::from);
        Self::load(file.as_deref())
    }

    /// Load and validate configuration, layering the environment over `file`.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let cfg = builder
            .build()
            .context("failed to build configuration")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.http_listen_host, "HTTP_LISTEN_HOST")?;
        ensure_non_empty_path(&self.data_path, "DATA_PATH")?;
        ensure_non_empty(&self.log_level, "LOG_LEVEL")?;
        if let Some(endpoint) = &self.otlp_endpoint {
            ensure_non_empty(endpoint, "OTLP_ENDPOINT")?;
        }

        if let Some(tls) = &self.tls {
            ensure_non_empty_path(&tls.key_store_file, "TLS__KEY_STORE_FILE")?;
            ensure_non_empty_path(&tls.key_store_password_file, "TLS__KEY_STORE_PASSWORD_FILE")?;
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

fn ensure_non_empty_path(value: &Path, name: &str) -> Result<()> {
    if value.as_os_str().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
