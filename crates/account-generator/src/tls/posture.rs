//! Listener options and the TLS posture applied to them.
//!
//! [`apply_tls_settings`] is a pure function: it never mutates its input and
//! returns a fresh [`ListenerOptions`] value. TLS is enabled iff TLS options
//! are configured; client certificates are required iff client-auth
//! constraints are configured. There is no optional client-auth mode.

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::server::danger::ClientCertVerifier;
use rustls::ServerConfig;
use tracing::info;

use super::keystore::{self, KeyMaterial};
use super::verifier::KnownClientsVerifier;
use crate::config::{ClientAuthConstraints, Config, TlsOptions};
use crate::error::{InitializationError, TlsError};

/// ALPN protocols offered by the listener.
const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Host, port, socket flags and TLS posture of the HTTP listener.
#[derive(Debug, Clone)]
pub struct ListenerOptions {
    pub host: String,
    pub port: u16,
    pub reuse_address: bool,
    pub reuse_port: bool,
    tls: Option<TlsPosture>,
}

impl ListenerOptions {
    /// Plain-HTTP options for `host:port` with address and port reuse enabled.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            reuse_address: true,
            reuse_port: true,
            tls: None,
        }
    }

    /// Base options derived from the listen address in `cfg`.
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.http_listen_host.clone(), cfg.http_listen_port)
    }

    pub fn ssl_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn tls(&self) -> Option<&TlsPosture> {
        self.tls.as_ref()
    }

    /// Client-auth mode; [`ClientAuth::None`] when TLS is disabled.
    pub fn client_auth(&self) -> &ClientAuth {
        match &self.tls {
            Some(posture) => posture.client_auth(),
            None => &ClientAuth::None,
        }
    }
}

/// Whether and how client certificates are checked.
#[derive(Debug, Clone)]
pub enum ClientAuth {
    None,
    Required(Arc<KnownClientsVerifier>),
}

impl ClientAuth {
    pub fn is_required(&self) -> bool {
        matches!(self, ClientAuth::Required(_))
    }
}

/// Resolved TLS settings: server identity, client-auth mode and the rustls
/// configuration built from them.
#[derive(Debug, Clone)]
pub struct TlsPosture {
    key_material: KeyMaterial,
    client_auth: ClientAuth,
    server_config: Arc<ServerConfig>,
}

impl TlsPosture {
    pub fn key_material(&self) -> &KeyMaterial {
        &self.key_material
    }

    pub fn client_auth(&self) -> &ClientAuth {
        &self.client_auth
    }

    /// rustls configuration consumed by the listener at bind time.
    pub fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.server_config)
    }
}

/// Return `base` upgraded with the TLS settings in `tls`.
///
/// # Errors
///
/// Any keystore, known-clients or rustls failure, wrapped in
/// [`InitializationError::Tls`]. TLS is never partially enabled.
pub fn apply_tls_settings(
    base: &ListenerOptions,
    tls: Option<&TlsOptions>,
) -> Result<ListenerOptions, InitializationError> {
    let Some(tls) = tls else {
        return Ok(base.clone());
    };

    let posture = build_posture(tls)?;
    info!(
        keystore = %posture.key_material().source().display(),
        client_auth_required = posture.client_auth().is_required(),
        "TLS enabled"
    );

    Ok(ListenerOptions {
        tls: Some(posture),
        ..base.clone()
    })
}

fn build_posture(tls: &TlsOptions) -> Result<TlsPosture, TlsError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let key_material = keystore::load(&tls.key_store_file, &tls.key_store_password_file)?;

    let client_auth = match &tls.client_auth {
        Some(constraints) => apply_client_authentication(constraints, Arc::clone(&provider))?,
        None => ClientAuth::None,
    };

    let server_config = build_server_config(&key_material, &client_auth, provider)?;
    Ok(TlsPosture {
        key_material,
        client_auth,
        server_config,
    })
}

fn apply_client_authentication(
    constraints: &ClientAuthConstraints,
    provider: Arc<CryptoProvider>,
) -> Result<ClientAuth, TlsError> {
    let verifier = KnownClientsVerifier::from_constraints(constraints, provider)?;
    info!(
        ca_authorized_clients_allowed = verifier.ca_authorized_clients_allowed(),
        "client certificates required"
    );
    Ok(ClientAuth::Required(Arc::new(verifier)))
}

fn build_server_config(
    key_material: &KeyMaterial,
    client_auth: &ClientAuth,
    provider: Arc<CryptoProvider>,
) -> Result<Arc<ServerConfig>, TlsError> {
    let builder = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(TlsError::ServerConfig)?;

    let builder = match client_auth {
        ClientAuth::None => builder.with_no_client_auth(),
        ClientAuth::Required(verifier) => {
            builder.with_client_cert_verifier(Arc::clone(verifier) as Arc<dyn ClientCertVerifier>)
        }
    };

    let mut config = builder
        .with_single_cert(key_material.cert_chain().to_vec(), key_material.private_key())
        .map_err(TlsError::ServerConfig)?;
    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    Ok(Arc::new(config))
}
