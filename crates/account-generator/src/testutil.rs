//! Fixtures shared by unit tests: scratch directories and generated certificates.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use p12_keystore::{KeyStore, KeyStoreEntry, PrivateKeyChain};
use rcgen::{BasicConstraints, CertificateParams, CertifiedKey, IsCa, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore};

use crate::config::TlsOptions;

pub use tempfile::TempDir;

/// Scratch directory named after `prefix`, removed on drop.
pub fn temp_dir(prefix: &str) -> TempDir {
    tempfile::Builder::new()
        .prefix(&format!("{prefix}-"))
        .tempdir()
        .expect("create temp dir")
}

/// Fixture file helpers for [`TempDir`].
pub trait TempDirExt {
    /// Write `contents` to `name` inside the directory and return its path.
    fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf;
}

impl TempDirExt for TempDir {
    fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, contents).expect("write temp file");
        path
    }
}

/// A certificate together with the key that signed it.
pub struct TestIdentity {
    pub cert: rcgen::Certificate,
    pub key: KeyPair,
}

impl TestIdentity {
    /// Self-signed leaf certificate for `name`.
    pub fn self_signed(name: &str) -> Self {
        let CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec![name.to_string()]).expect("self-signed cert");
        Self {
            cert,
            key: key_pair,
        }
    }

    /// Self-signed certificate authority.
    pub fn ca() -> Self {
        let mut params = CertificateParams::new(Vec::<String>::new()).expect("ca params");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let key = KeyPair::generate().expect("ca key");
        let cert = params.self_signed(&key).expect("ca cert");
        Self { cert, key }
    }

    /// Leaf certificate for `name` issued by `issuer`.
    pub fn signed_by(name: &str, issuer: &TestIdentity) -> Self {
        let params = CertificateParams::new(vec![name.to_string()]).expect("leaf params");
        let key = KeyPair::generate().expect("leaf key");
        let cert = params
            .signed_by(&key, &issuer.cert, &issuer.key)
            .expect("leaf cert");
        Self { cert, key }
    }

    pub fn der(&self) -> CertificateDer<'static> {
        self.cert.der().clone()
    }

    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivatePkcs8KeyDer::from(self.key.serialize_der()).into()
    }

    /// Certificate followed by its unencrypted PKCS#8 key, as one PEM bundle.
    pub fn keystore_pem(&self) -> String {
        format!("{}{}", self.cert.pem(), self.key.serialize_pem())
    }

    /// PKCS#12 keystore holding this identity under the alias `server`,
    /// encrypted with `password`.
    pub fn keystore_p12(&self, password: &str) -> Vec<u8> {
        let cert = p12_keystore::Certificate::from_der(self.cert.der()).expect("p12 certificate");
        let chain = PrivateKeyChain::new(self.key.serialize_der(), [1u8; 20], vec![cert]);
        let mut store = KeyStore::new();
        store.add_entry("server", KeyStoreEntry::PrivateKeyChain(chain));
        store.writer(password).write().expect("write p12")
    }
}

/// Write a keystore and password file for `identity` and return matching options.
pub fn write_tls_options(dir: &TempDir, identity: &TestIdentity) -> TlsOptions {
    TlsOptions {
        key_store_file: dir.write("server.p12", identity.keystore_p12("changeit")),
        key_store_password_file: dir.write("server.pass", "changeit\n"),
        client_auth: None,
    }
}

/// Client configuration trusting `server` and presenting `client`, if any.
pub fn client_config(server: &TestIdentity, client: Option<&TestIdentity>) -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.add(server.der()).expect("trust server cert");
    let builder = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .expect("protocol versions")
    .with_root_certificates(roots);

    let config = match client {
        Some(identity) => builder
            .with_client_auth_cert(vec![identity.der()], identity.private_key())
            .expect("client cert"),
        None => builder.with_no_client_auth(),
    };
    Arc::new(config)
}
