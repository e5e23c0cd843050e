//! One-time signing-key provisioning.
//!
//! Runs once at boot before the delivery loops start. The firmware
//! original checks the secure element for the well-known key id and
//! generates only on a miss; this is the same check against the file
//! store. The caller publishes the public key to the registration
//! endpoint only when `first_boot` is set.

use tracing::info;

use bp_crypto::DeviceSigningKey;

use crate::error::StoreError;
use crate::keystore::KeyStore;

/// Well-known identifier of the device signing key.
pub const SIGNING_KEY_ID: &str = "device-signing-key";

pub struct Provisioned {
    pub key: DeviceSigningKey,
    /// True exactly once per device lifetime: the key was generated by
    /// this call and its public half has never been published.
    pub first_boot: bool,
}

/// Idempotent: the second and every later call opens the existing key
/// and is a no-op otherwise.
pub fn ensure_signing_key(store: &KeyStore) -> Result<Provisioned, StoreError> {
    if store.has_key(SIGNING_KEY_ID) {
        let key = store.open_key(SIGNING_KEY_ID)?;
        info!(id = SIGNING_KEY_ID, "signing key already provisioned");
        return Ok(Provisioned { key, first_boot: false });
    }
    let key = store.generate_and_persist(SIGNING_KEY_ID)?;
    info!(id = SIGNING_KEY_ID, "signing key generated");
    Ok(Provisioned { key, first_boot: true })
}
