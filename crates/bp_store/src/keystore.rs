//! File-backed key store.
//!
//! One file per key id: `<dir>/<id>.p8` holding PKCS#8 DER. Files are
//! created with mode 0600 on unix. Writes go through a temp file +
//! rename so a crash mid-write never leaves a truncated key behind.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use bp_crypto::DeviceSigningKey;

use crate::error::StoreError;

pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    /// Open (creating if needed) a key store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn key_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.p8"))
    }

    pub fn has_key(&self, id: &str) -> bool {
        self.key_path(id).is_file()
    }

    /// Load an existing key; `NotFound` if it was never provisioned.
    pub fn open_key(&self, id: &str) -> Result<DeviceSigningKey, StoreError> {
        let path = self.key_path(id);
        if !path.is_file() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let der = fs::read(&path)?;
        Ok(DeviceSigningKey::from_pkcs8_der(&der)?)
    }

    /// Generate a fresh signing key and persist it under `id`.
    pub fn generate_and_persist(&self, id: &str) -> Result<DeviceSigningKey, StoreError> {
        let key = DeviceSigningKey::generate();
        let der = key.to_pkcs8_der()?;

        let path = self.key_path(id);
        let tmp = self.dir.join(format!("{id}.p8.tmp"));
        fs::write(&tmp, der.as_slice())?;
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, &path)?;

        info!(id, path = %path.display(), "signing key persisted");
        Ok(key)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_key_before_generation_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path()).unwrap();
        assert!(!store.has_key("device-signing-key"));
        assert!(matches!(
            store.open_key("device-signing-key"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn generated_key_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let generated = {
            let store = KeyStore::open(dir.path()).unwrap();
            store.generate_and_persist("device-signing-key").unwrap()
        };
        let store = KeyStore::open(dir.path()).unwrap();
        let reopened = store.open_key("device-signing-key").unwrap();
        assert_eq!(
            generated.public_key_der().unwrap(),
            reopened.public_key_der().unwrap()
        );
    }

    #[test]
    fn corrupt_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("device-signing-key.p8"), b"garbage").unwrap();
        assert!(matches!(
            store.open_key("device-signing-key"),
            Err(StoreError::InvalidKeyMaterial(_))
        ));
    }
}
