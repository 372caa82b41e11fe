//! Startup error taxonomy.
//!
//! Every error here is fatal: the process logs it and exits non-zero. There is
//! no degraded startup (e.g. falling back to plain HTTP when TLS fails).

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors produced while resolving the TLS posture.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A configured file does not exist.
    #[error("requested file {} does not exist at specified location", path.display())]
    FileNotFound { path: PathBuf },

    /// The process lacks permission to read a configured file.
    #[error("current user does not have permissions to access {}", path.display())]
    AccessDenied { path: PathBuf },

    /// Any other I/O fault while reading a configured file.
    #[error("failed to load TLS file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The first line of the password file is empty.
    #[error("keystore password file {} is empty", path.display())]
    EmptyPassword { path: PathBuf },

    /// The keystore bundle is unreadable as a certificate chain plus key.
    #[error("invalid keystore {}: {reason}", path.display())]
    InvalidKeyStore { path: PathBuf, reason: String },

    /// An allowlist entry is not a well-formed certificate fingerprint.
    #[error("illegally formatted client fingerprint file {} (line {line}): {reason}", path.display())]
    InvalidAllowlistFormat {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The CA set for CA-authorized clients is empty or unusable.
    #[error("invalid client CA certificates: {reason}")]
    InvalidCaCertificates { reason: String },

    /// Client authentication would reject every client.
    #[error(
        "client authentication requires a non-empty known clients file or ca_authorized_client_allowed = true"
    )]
    ClientLockout,

    /// rustls rejected the assembled server configuration.
    #[error("failed to build TLS server configuration")]
    ServerConfig(#[source] rustls::Error),
}

impl TlsError {
    /// Classify an I/O error raised while reading `path`.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => TlsError::FileNotFound { path },
            io::ErrorKind::PermissionDenied => TlsError::AccessDenied { path },
            _ => TlsError::Io { path, source },
        }
    }
}

/// The single error surfaced by the bootstrap to the process entry point.
#[derive(Debug, Error)]
pub enum InitializationError {
    /// TLS could not be configured; nothing was started.
    #[error("failed to configure TLS")]
    Tls(#[from] TlsError),

    /// The event-processing runtime could not be created.
    #[error("failed to start async runtime")]
    Runtime(#[source] io::Error),

    /// The key generation backend could not be constructed.
    #[error("failed to create key generator backend")]
    Backend(#[source] anyhow::Error),

    /// The HTTP listener could not be bound.
    #[error("failed to create http service on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The data path could not be written.
    #[error("failed to write {}", path.display())]
    DataPath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl InitializationError {
    pub(crate) fn bind(addr: impl std::fmt::Display, source: io::Error) -> Self {
        InitializationError::Bind {
            addr: addr.to_string(),
            source,
        }
    }
}
