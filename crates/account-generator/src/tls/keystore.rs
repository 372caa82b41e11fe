//! Loads the server identity (certificate chain + private key) from disk.
//!
//! Two keystore formats are accepted, told apart by their first bytes:
//!
//! - **PKCS#12** (`.p12` / `.pfx`), unlocked with the first line of the
//!   password file. The first private-key entry supplies the key and its
//!   certificate chain.
//! - **PEM bundle**: the certificate chain, leaf first, and one private key.
//!   The key may be an `ENCRYPTED PRIVATE KEY` (PKCS#8 PBES2), decrypted with
//!   the password, or an unencrypted PKCS#8 / PKCS#1 / SEC1 key, in which case
//!   the password is read but unused.

use std::fs;
use std::path::{Path, PathBuf};

use p12_keystore::KeyStore;
use pkcs8::der::SecretDocument;
use pkcs8::EncryptedPrivateKeyInfo;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tracing::debug;

use crate::error::TlsError;

const ENCRYPTED_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";
const PEM_PREAMBLE: &[u8] = b"-----BEGIN";

/// Certificate chain and private key used as the TLS server identity.
pub struct KeyMaterial {
    source: PathBuf,
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl KeyMaterial {
    /// Absolute path of the keystore this material was read from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Certificate chain, leaf first.
    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.cert_chain
    }

    /// A fresh copy of the private key, for handing to rustls.
    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        self.key.clone_key()
    }
}

impl Clone for KeyMaterial {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            cert_chain: self.cert_chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("KeyMaterial")
            .field("source", &self.source)
            .field("certificates", &self.cert_chain.len())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Keystore password, zeroed on drop.
struct Password(String);

impl Password {
    fn as_str(&self) -> &str {
        &self.0
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Drop for Password {
    fn drop(&mut self) {
        let mut bytes = std::mem::take(&mut self.0).into_bytes();
        bytes.iter_mut().for_each(|b| *b = 0);
    }
}

/// Read the keystore at `key_store_file`, unlocking it with the password in
/// `password_file`.
///
/// # Errors
///
/// - [`TlsError::FileNotFound`] / [`TlsError::AccessDenied`] / [`TlsError::Io`]
///   naming whichever file could not be read.
/// - [`TlsError::EmptyPassword`] if the first line of the password file is empty.
/// - [`TlsError::InvalidKeyStore`] if the store cannot be unlocked with the
///   password, or lacks a certificate or a usable key.
pub fn load(key_store_file: &Path, password_file: &Path) -> Result<KeyMaterial, TlsError> {
    let source =
        std::path::absolute(key_store_file).map_err(|e| TlsError::from_io(key_store_file, e))?;
    let password = read_password(password_file)?;
    let bundle = fs::read(&source).map_err(|e| TlsError::from_io(&source, e))?;

    let (format, identity) = if bundle.trim_ascii_start().starts_with(PEM_PREAMBLE) {
        ("pem", read_pem_bundle(&bundle, &password))
    } else {
        ("pkcs12", read_pkcs12(&bundle, &password))
    };
    let (cert_chain, key) = identity.map_err(|reason| invalid(&source, reason))?;

    debug!(
        keystore = %source.display(),
        format,
        certificates = cert_chain.len(),
        "loaded TLS keystore"
    );

    Ok(KeyMaterial {
        source,
        cert_chain,
        key,
    })
}

type Identity = (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>);

fn read_pkcs12(bundle: &[u8], password: &Password) -> Result<Identity, String> {
    let store = KeyStore::from_pkcs12(bundle, password.as_str())
        .map_err(|e| format!("cannot open PKCS#12 keystore with the configured password: {e}"))?;
    let (alias, chain) = store
        .private_key_chain()
        .ok_or("no private key entry found")?;

    let cert_chain: Vec<CertificateDer<'static>> = chain
        .chain()
        .iter()
        .map(|cert| CertificateDer::from(cert.as_der().to_vec()))
        .collect();
    if cert_chain.is_empty() {
        return Err(format!("entry {alias:?} has no certificate"));
    }

    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(chain.key().to_vec()));
    Ok((cert_chain, key))
}

fn read_pem_bundle(bundle: &[u8], password: &Password) -> Result<Identity, String> {
    let cert_chain = rustls_pemfile::certs(&mut &bundle[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("unreadable certificate: {e}"))?;
    if cert_chain.is_empty() {
        return Err("no certificate found".into());
    }

    let key = match rustls_pemfile::private_key(&mut &bundle[..])
        .map_err(|e| format!("unreadable private key: {e}"))?
    {
        Some(key) => key,
        None => decrypt_private_key(bundle, password)?,
    };
    Ok((cert_chain, key))
}

/// Read exactly the first line of `path`, trailing whitespace stripped.
fn read_password(path: &Path) -> Result<Password, TlsError> {
    let contents = fs::read_to_string(path).map_err(|e| TlsError::from_io(path, e))?;
    let first = contents.lines().next().unwrap_or_default().trim_end();
    if first.is_empty() {
        return Err(TlsError::EmptyPassword {
            path: path.to_path_buf(),
        });
    }
    Ok(Password(first.to_owned()))
}

fn decrypt_private_key(bundle: &[u8], password: &Password) -> Result<PrivateKeyDer<'static>, String> {
    let text = std::str::from_utf8(bundle).map_err(|_| "keystore is not a PEM text file")?;
    let section = pem_section(text, ENCRYPTED_KEY_LABEL).ok_or("no private key found")?;
    let (label, der) = SecretDocument::from_pem(section)
        .map_err(|e| format!("malformed encrypted private key: {e}"))?;
    if label != ENCRYPTED_KEY_LABEL {
        return Err(format!("unexpected PEM label {label:?}"));
    }

    let info = EncryptedPrivateKeyInfo::try_from(der.as_bytes())
        .map_err(|e| format!("malformed encrypted private key: {e}"))?;
    let document = info
        .decrypt(password.as_bytes())
        .map_err(|_| "failed to decrypt private key with the configured password".to_string())?;

    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        document.as_bytes().to_vec(),
    )))
}

/// The first complete PEM section labelled `label`, armour included.
fn pem_section<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let start = text.find(&begin)?;
    let stop = start + text[start..].find(&end)? + end.len();
    Some(&text[start..stop])
}

fn invalid(path: &Path, reason: impl Into<String>) -> TlsError {
    TlsError::InvalidKeyStore {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}
