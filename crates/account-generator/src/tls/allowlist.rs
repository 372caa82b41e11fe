//! Known-clients file: the closed set of accepted client certificate fingerprints.
//!
//! # File format
//!
//! ```text
//! # comment
//! DF:65:B8:02:08:5E:91:82:0F:91:F5:1C:96:56:92:C4:1A:F6:C6:27:FD:6C:FC:31:F2:BB:90:17:22:59:5B:50
//! billing-service 9c3b1f...   (optional name, then fingerprint)
//! ```
//!
//! A fingerprint is the SHA-256 digest of the DER-encoded certificate: 64 hex
//! digits, case-insensitive, either bare or as `:`-separated byte pairs. Every entry is
//! validated at load time; one malformed line rejects the whole file.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use rustls::pki_types::CertificateDer;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::TlsError;

/// Byte length of a SHA-256 certificate fingerprint.
pub const FINGERPRINT_LEN: usize = 32;

/// SHA-256 fingerprint of a DER-encoded certificate.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Fingerprint of `cert`.
    pub fn of(cert: &CertificateDer<'_>) -> Self {
        Self(Sha256::digest(cert.as_ref()).into())
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = if s.contains(':') {
            let groups: Vec<&str> = s.split(':').collect();
            if groups.len() != FINGERPRINT_LEN || groups.iter().any(|g| g.len() != 2) {
                return Err(format!(
                    "expected {FINGERPRINT_LEN} colon-separated pairs of hex digits"
                ));
            }
            groups.concat()
        } else {
            s.to_owned()
        };
        if digits.len() != FINGERPRINT_LEN * 2 {
            return Err(format!(
                "expected {} hex digits, found {}",
                FINGERPRINT_LEN * 2,
                digits.len()
            ));
        }
        let mut bytes = [0u8; FINGERPRINT_LEN];
        hex::decode_to_slice(&digits, &mut bytes).map_err(|e| e.to_string())?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    /// Upper-case, colon-separated hex.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

/// Fingerprints read from a known-clients file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownClients {
    fingerprints: HashSet<Fingerprint>,
}

impl KnownClients {
    /// Read and validate the known-clients file at `path`.
    ///
    /// # Errors
    ///
    /// - I/O failures classified by [`TlsError::from_io`].
    /// - [`TlsError::InvalidAllowlistFormat`] naming the first malformed line.
    pub fn load(path: &Path) -> Result<Self, TlsError> {
        let contents = fs::read_to_string(path).map_err(|e| TlsError::from_io(path, e))?;
        let clients = Self::parse(&contents).map_err(|(line, reason)| {
            TlsError::InvalidAllowlistFormat {
                path: path.to_path_buf(),
                line,
                reason,
            }
        })?;
        info!(
            file = %path.display(),
            clients = clients.len(),
            "loaded known clients"
        );
        Ok(clients)
    }

    /// Parse file contents; errors carry the 1-based line number.
    fn parse(contents: &str) -> Result<Self, (usize, String)> {
        let mut fingerprints = HashSet::new();
        for (index, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let candidate = match fields.as_slice() {
                [fingerprint] | [_, fingerprint] => *fingerprint,
                _ => {
                    return Err((
                        index + 1,
                        "expected `<fingerprint>` or `<name> <fingerprint>`".into(),
                    ))
                }
            };
            let fingerprint = candidate.parse::<Fingerprint>().map_err(|reason| (index + 1, reason))?;
            fingerprints.insert(fingerprint);
        }
        Ok(Self { fingerprints })
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

impl FromIterator<Fingerprint> for KnownClients {
    fn from_iter<I: IntoIterator<Item = Fingerprint>>(iter: I) -> Self {
        Self {
            fingerprints: iter.into_iter().collect(),
        }
    }
}
