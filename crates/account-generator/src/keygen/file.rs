//! File-backed key generator: persists random secret material under the data path.
//!
//! Each generated account is a `<uuid>.key` file holding 32 random bytes as
//! hex. Files are created exclusively and, on Unix, readable by the owner only.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::{rngs::OsRng, RngCore};
use tracing::info;
use uuid::Uuid;

use super::{GeneratedAccount, KeyGenError, KeyGenerator, KeyGeneratorProvider};

/// Byte length of generated secret material.
pub const SECRET_LEN: usize = 32;

/// Provider for [`FileKeyGenerator`].
#[derive(Debug)]
pub struct FileKeyGeneratorProvider {
    generator: Arc<FileKeyGenerator>,
}

impl FileKeyGeneratorProvider {
    /// Create the provider, creating `data_path` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`KeyGenError::Io`] if the directory cannot be created.
    pub fn new(data_path: &Path) -> Result<Self, KeyGenError> {
        fs::create_dir_all(data_path).map_err(|source| KeyGenError::Io {
            path: data_path.to_path_buf(),
            source,
        })?;
        info!(data_path = %data_path.display(), "file key generator ready");
        Ok(Self {
            generator: Arc::new(FileKeyGenerator {
                directory: data_path.to_path_buf(),
                shut_down: AtomicBool::new(false),
            }),
        })
    }
}

impl KeyGeneratorProvider for FileKeyGeneratorProvider {
    fn generator(&self) -> Arc<dyn KeyGenerator> {
        self.generator.clone()
    }

    fn shutdown(&self) {
        self.generator.shut_down.store(true, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct FileKeyGenerator {
    directory: PathBuf,
    shut_down: AtomicBool,
}

impl KeyGenerator for FileKeyGenerator {
    fn generate(&self) -> Result<GeneratedAccount, KeyGenError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(KeyGenError::ShutDown);
        }

        let id = Uuid::new_v4().to_string();
        let path = self.directory.join(format!("{id}.key"));

        let mut secret = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut secret);
        let written = write_secret(&path, &secret);
        secret.iter_mut().for_each(|b| *b = 0);
        written.map_err(|source| KeyGenError::Io {
            path: path.clone(),
            source,
        })?;

        info!(account_id = %id, "generated account");
        Ok(GeneratedAccount {
            id,
            key_location: path,
        })
    }
}

fn write_secret(path: &Path, secret: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    writeln!(file, "{}", hex::encode(secret))?;
    file.sync_all()
}
