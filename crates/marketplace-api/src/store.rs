//! License key storage
//!
//! The license key is a singleton slot: zero or one key at a time. Absence
//! ("not configured") is a distinct state from an empty string.
//!
//! `FileLicenseKeyStore` keeps the slot in a small JSON file. It reads the
//! file on every call instead of caching, so a key written by another
//! process is seen immediately. Writes use atomic temp-file + rename and a
//! tokio Mutex serializes writers within the process.

use std::path::{Path, PathBuf};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::BoxFuture;
use crate::error::{Error, Result};

/// Persisted single-value slot holding the license key.
pub trait LicenseKeyStore: Send + Sync {
    fn has(&self) -> BoxFuture<'_, Result<bool>>;

    /// Fails with `Error::LicenseKeyMissing` when no key is stored.
    fn get(&self) -> BoxFuture<'_, Result<Secret<String>>>;

    /// Store `key`, replacing any previous value.
    fn set(&self, key: Secret<String>) -> BoxFuture<'_, Result<()>>;

    /// Remove the key. Removing an absent key is not an error.
    fn delete(&self) -> BoxFuture<'_, Result<()>>;
}

/// On-disk layout of the license key file.
#[derive(Serialize, Deserialize)]
struct StoredLicenseKey {
    license_key: String,
}

/// License key slot backed by a JSON file with 0600 permissions.
pub struct FileLicenseKeyStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileLicenseKeyStore {
    /// The file is not created until a key is set.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Option<String>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Storage(format!("reading license key file: {e}"))),
        };
        let stored: StoredLicenseKey = serde_json::from_str(&contents)
            .map_err(|e| Error::Storage(format!("parsing license key file: {e}")))?;
        Ok(Some(stored.license_key))
    }
}

impl LicenseKeyStore for FileLicenseKeyStore {
    fn has(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(self.read().await?.is_some()) })
    }

    fn get(&self) -> BoxFuture<'_, Result<Secret<String>>> {
        Box::pin(async move {
            self.read()
                .await?
                .map(Secret::new)
                .ok_or(Error::LicenseKeyMissing)
        })
    }

    fn set(&self, key: Secret<String>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let stored = StoredLicenseKey {
                license_key: key.expose().clone(),
            };
            write_atomic(&self.path, &stored).await
        })
    }

    fn delete(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => {
                    debug!(path = %self.path.display(), "removed license key file");
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(Error::Storage(format!("removing license key file: {e}"))),
            }
        })
    }
}

/// Write the license key file atomically (temp file in the same directory,
/// then rename). Permissions are set to 0600 before the rename.
async fn write_atomic(path: &Path, stored: &StoredLicenseKey) -> Result<()> {
    let json = serde_json::to_string_pretty(stored)
        .map_err(|e| Error::Storage(format!("serializing license key: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage("license key path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".license_key.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Storage(format!("writing temp license key file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Storage(format!("setting license key file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Storage(format!("renaming temp license key file: {e}")))?;

    debug!(path = %path.display(), "persisted license key");
    Ok(())
}

/// In-process license key slot.
#[derive(Default)]
pub struct MemoryLicenseKeyStore {
    slot: Mutex<Option<Secret<String>>>,
}

impl MemoryLicenseKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(Secret::new(key.into()))),
        }
    }
}

impl LicenseKeyStore for MemoryLicenseKeyStore {
    fn has(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(self.slot.lock().await.is_some()) })
    }

    fn get(&self) -> BoxFuture<'_, Result<Secret<String>>> {
        Box::pin(async move { self.slot.lock().await.clone().ok_or(Error::LicenseKeyMissing) })
    }

    fn set(&self, key: Secret<String>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.slot.lock().await = Some(key);
            Ok(())
        })
    }

    fn delete(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.slot.lock().await.take();
            Ok(())
        })
    }
}
