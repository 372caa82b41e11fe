//! Structured logging setup.
//!
//! # Logging invariants
//!
//! - **No key material** may appear in any log field: keystore passwords,
//!   private keys and generated secrets are never logged. Account identifiers
//!   and file locations are fine.
//! - Log level is configurable via `log_level` (default: `info`); `RUST_LOG`
//!   takes precedence when set.

pub mod init;

pub use init::init_telemetry;
