//! Server-side client certificate verifier for mutual TLS.
//!
//! A client is accepted when its certificate fingerprint is listed in the
//! known-clients file, or, when CA-authorized clients are allowed, when its
//! chain verifies against the trusted CA set. Everything else is rejected
//! during the handshake. Client certificates are always mandatory.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::WebPkiClientVerifier;
use rustls::{
    CertificateError, DigitallySignedStruct, DistinguishedName, Error as RustlsError,
    RootCertStore, SignatureScheme,
};
use tracing::{debug, warn};

use super::allowlist::{Fingerprint, KnownClients};
use crate::config::ClientAuthConstraints;
use crate::error::TlsError;

/// Trust decision consulted once per inbound handshake.
#[derive(Debug)]
pub struct KnownClientsVerifier {
    known_clients: KnownClients,
    /// Present iff CA-authorized clients are allowed.
    ca_verifier: Option<Arc<dyn ClientCertVerifier>>,
    algorithms: WebPkiSupportedAlgorithms,
}

impl KnownClientsVerifier {
    /// Build the verifier described by `constraints`.
    ///
    /// # Errors
    ///
    /// - Known-clients file errors from [`KnownClients::load`].
    /// - [`TlsError::ClientLockout`] when neither a non-empty known-clients file
    ///   nor CA-authorized clients are configured.
    /// - [`TlsError::InvalidCaCertificates`] when the CA set is unusable.
    pub fn from_constraints(
        constraints: &ClientAuthConstraints,
        provider: Arc<CryptoProvider>,
    ) -> Result<Self, TlsError> {
        let known_clients = match &constraints.known_clients_file {
            Some(path) => KnownClients::load(path)?,
            None => KnownClients::default(),
        };

        if known_clients.is_empty() && !constraints.ca_authorized_client_allowed {
            return Err(TlsError::ClientLockout);
        }

        let ca_verifier = if constraints.ca_authorized_client_allowed {
            let roots = match &constraints.ca_certificates_file {
                Some(path) => load_ca_roots(path)?,
                None => RootCertStore {
                    roots: webpki_roots::TLS_SERVER_ROOTS.into(),
                },
            };
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
                .build()
                .map_err(|e| TlsError::InvalidCaCertificates {
                    reason: e.to_string(),
                })?;
            Some(verifier)
        } else {
            None
        };

        Ok(Self::new(known_clients, ca_verifier, &provider))
    }

    pub fn new(
        known_clients: KnownClients,
        ca_verifier: Option<Arc<dyn ClientCertVerifier>>,
        provider: &CryptoProvider,
    ) -> Self {
        Self {
            known_clients,
            ca_verifier,
            algorithms: provider.signature_verification_algorithms,
        }
    }

    /// Whether `fingerprint` is explicitly listed.
    pub fn allows_fingerprint(&self, fingerprint: &Fingerprint) -> bool {
        self.known_clients.contains(fingerprint)
    }

    /// Whether clients signed by a trusted CA are accepted without listing.
    pub fn ca_authorized_clients_allowed(&self) -> bool {
        self.ca_verifier.is_some()
    }
}

fn load_ca_roots(path: &Path) -> Result<RootCertStore, TlsError> {
    let pem = fs::read(path).map_err(|e| TlsError::from_io(path, e))?;
    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::InvalidCaCertificates {
            reason: format!("{}: {e}", path.display()),
        })?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(TlsError::InvalidCaCertificates {
            reason: format!("{} contains no usable CA certificate", path.display()),
        });
    }
    if ignored > 0 {
        warn!(file = %path.display(), ignored, "ignored unparsable CA certificates");
    }
    Ok(roots)
}

impl ClientCertVerifier for KnownClientsVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        true
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        match &self.ca_verifier {
            Some(ca) => ca.root_hint_subjects(),
            None => &[],
        }
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, RustlsError> {
        let fingerprint = Fingerprint::of(end_entity);
        if self.allows_fingerprint(&fingerprint) {
            debug!(%fingerprint, "accepted known client");
            return Ok(ClientCertVerified::assertion());
        }

        if let Some(ca) = &self.ca_verifier {
            return ca
                .verify_client_cert(end_entity, intermediates, now)
                .inspect(|_| debug!(%fingerprint, "accepted CA-authorized client"))
                .inspect_err(|e| warn!(%fingerprint, error = %e, "rejected client certificate"));
        }

        warn!(%fingerprint, "rejected client certificate: not a known client");
        Err(RustlsError::InvalidCertificate(
            CertificateError::ApplicationVerificationFailure,
        ))
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{temp_dir, TempDirExt, TestIdentity};

    fn provider() -> Arc<CryptoProvider> {
        Arc::new(rustls::crypto::ring::default_provider())
    }

    fn constraints(
        known_clients_file: Option<std::path::PathBuf>,
        ca_authorized_client_allowed: bool,
    ) -> ClientAuthConstraints {
        ClientAuthConstraints {
            known_clients_file,
            ca_authorized_client_allowed,
            ca_certificates_file: None,
        }
    }

    #[test]
    fn only_listed_fingerprint_is_accepted_without_ca() {
        let dir = temp_dir("verifier");
        let listed = TestIdentity::self_signed("listed");
        let stranger = TestIdentity::self_signed("stranger");
        let file = dir.write(
            "clients.txt",
            format!("listed {}\n", Fingerprint::of(&listed.der())),
        );

        let verifier =
            KnownClientsVerifier::from_constraints(&constraints(Some(file), false), provider())
                .unwrap();

        assert!(verifier
            .verify_client_cert(&listed.der(), &[], UnixTime::now())
            .is_ok());
        assert!(verifier
            .verify_client_cert(&stranger.der(), &[], UnixTime::now())
            .is_err());
        assert!(!verifier.ca_authorized_clients_allowed());
    }

    #[test]
    fn ca_signed_client_accepted_when_allowed() {
        let dir = temp_dir("verifier");
        let ca = TestIdentity::ca();
        let client = TestIdentity::signed_by("client", &ca);
        let ca_file = dir.write("ca.pem", ca.cert.pem());

        let verifier = KnownClientsVerifier::from_constraints(
            &ClientAuthConstraints {
                known_clients_file: None,
                ca_authorized_client_allowed: true,
                ca_certificates_file: Some(ca_file),
            },
            provider(),
        )
        .unwrap();

        assert!(verifier
            .verify_client_cert(&client.der(), &[], UnixTime::now())
            .is_ok());
        let stranger = TestIdentity::self_signed("stranger");
        assert!(verifier
            .verify_client_cert(&stranger.der(), &[], UnixTime::now())
            .is_err());
    }

    #[test]
    fn listed_client_accepted_even_when_ca_rejects_it() {
        let dir = temp_dir("verifier");
        let ca = TestIdentity::ca();
        let listed = TestIdentity::self_signed("listed");
        let clients = dir.write("clients.txt", format!("{}\n", Fingerprint::of(&listed.der())));
        let ca_file = dir.write("ca.pem", ca.cert.pem());

        let verifier = KnownClientsVerifier::from_constraints(
            &ClientAuthConstraints {
                known_clients_file: Some(clients),
                ca_authorized_client_allowed: true,
                ca_certificates_file: Some(ca_file),
            },
            provider(),
        )
        .unwrap();

        assert!(verifier
            .verify_client_cert(&listed.der(), &[], UnixTime::now())
            .is_ok());
    }

    #[test]
    fn ca_signed_client_rejected_when_not_allowed() {
        let dir = temp_dir("verifier");
        let ca = TestIdentity::ca();
        let client = TestIdentity::signed_by("client", &ca);
        let other = TestIdentity::self_signed("other");
        let file = dir.write("clients.txt", format!("{}\n", Fingerprint::of(&other.der())));

        let verifier =
            KnownClientsVerifier::from_constraints(&constraints(Some(file), false), provider())
                .unwrap();
        assert!(verifier
            .verify_client_cert(&client.der(), &[], UnixTime::now())
            .is_err());
    }

    #[test]
    fn no_list_and_no_ca_is_a_lockout() {
        let err = KnownClientsVerifier::from_constraints(&constraints(None, false), provider())
            .unwrap_err();
        assert!(matches!(err, TlsError::ClientLockout));
    }

    #[test]
    fn empty_list_and_no_ca_is_a_lockout() {
        let dir = temp_dir("verifier");
        let file = dir.write("clients.txt", "# nobody yet\n");
        let err = KnownClientsVerifier::from_constraints(&constraints(Some(file), false), provider())
            .unwrap_err();
        assert!(matches!(err, TlsError::ClientLockout));
    }

    #[test]
    fn no_list_with_ca_uses_default_roots() {
        let verifier =
            KnownClientsVerifier::from_constraints(&constraints(None, true), provider()).unwrap();
        assert!(verifier.ca_authorized_clients_allowed());
        assert!(!verifier.root_hint_subjects().is_empty());
    }

    #[test]
    fn ca_file_without_certificates_is_rejected() {
        let dir = temp_dir("verifier");
        let ca_file = dir.write("ca.pem", "no pem here\n");
        let err = KnownClientsVerifier::from_constraints(
            &ClientAuthConstraints {
                known_clients_file: None,
                ca_authorized_client_allowed: true,
                ca_certificates_file: Some(ca_file),
            },
            provider(),
        )
        .unwrap_err();
        assert!(matches!(err, TlsError::InvalidCaCertificates { .. }));
    }

    #[test]
    fn client_auth_is_mandatory() {
        let listed = TestIdentity::self_signed("listed");
        let verifier = KnownClientsVerifier::new(
            [Fingerprint::of(&listed.der())].into_iter().collect(),
            None,
            &rustls::crypto::ring::default_provider(),
        );
        assert!(verifier.offer_client_auth());
        assert!(verifier.client_auth_mandatory());
        assert!(verifier.root_hint_subjects().is_empty());
    }
}
