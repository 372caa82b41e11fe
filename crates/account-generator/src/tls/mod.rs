//! TLS posture of the HTTP listener.
//!
//! # Responsibilities
//! - Load the server identity from the keystore bundle ([`keystore`]).
//! - Load the known-clients fingerprint file ([`allowlist`]).
//! - Verify client certificates during the handshake ([`verifier`]).
//! - Fold all of the above into immutable [`ListenerOptions`] ([`posture`]).
//!
//! # Security invariants
//!
//! - Keystore passwords and private keys are never logged.
//! - Configuration problems fail startup; TLS is never silently downgraded.

pub mod allowlist;
pub mod keystore;
pub mod posture;
pub mod verifier;

pub use posture::{apply_tls_settings, ListenerOptions};
