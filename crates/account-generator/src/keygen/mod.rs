//! Key generation backend seam.
//!
//! The backend is an external collaborator reached through two traits:
//! [`KeyGeneratorProvider`] owns backend resources and hands out a
//! [`KeyGenerator`]. The bootstrap wraps the provider in a [`ProviderHandle`]
//! shared between the running service and the shutdown path; whichever calls
//! [`ProviderHandle::release`] first shuts the backend down, later calls are
//! no-ops.

pub mod file;

pub use file::FileKeyGeneratorProvider;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

/// Errors produced by a key generation backend.
#[derive(Debug, Error)]
pub enum KeyGenError {
    /// The backend has been shut down and no longer generates keys.
    #[error("key generator has been shut down")]
    ShutDown,

    /// The backend could not persist key material.
    #[error("failed to write key material to {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A freshly generated account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAccount {
    /// Backend-assigned identifier.
    pub id: String,
    /// Where the key material was persisted.
    pub key_location: PathBuf,
}

/// Generates new account key material.
#[cfg_attr(test, mockall::automock)]
pub trait KeyGenerator: Send + Sync {
    fn generate(&self) -> Result<GeneratedAccount, KeyGenError>;
}

/// Owns the resources of a key generation backend.
#[cfg_attr(test, mockall::automock)]
pub trait KeyGeneratorProvider: Send + Sync {
    /// The generator requests are dispatched to.
    fn generator(&self) -> Arc<dyn KeyGenerator>;

    /// Release backend resources. Called at most once by [`ProviderHandle`].
    fn shutdown(&self);
}

/// Shared handle guaranteeing the backend is released at most once.
pub struct ProviderHandle {
    provider: Arc<dyn KeyGeneratorProvider>,
    released: AtomicBool,
}

impl ProviderHandle {
    pub fn new(provider: Arc<dyn KeyGeneratorProvider>) -> Self {
        Self {
            provider,
            released: AtomicBool::new(false),
        }
    }

    pub fn generator(&self) -> Arc<dyn KeyGenerator> {
        self.provider.generator()
    }

    /// Shut the backend down. Returns `false` if it was already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.provider.shutdown();
        info!("key generator backend released");
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}
