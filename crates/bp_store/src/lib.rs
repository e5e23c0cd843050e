//! bp_store — Persistent key storage for the BatteryPass telemetry agent
//!
//! The only durable secret is the device's long-term ECDSA signing key,
//! stored as a PKCS#8 DER file under a well-known identifier in the
//! agent's data directory (the firmware equivalent keeps it in the
//! secure element under a fixed key id). Provisioning is idempotent:
//! the key is generated at most once per device lifetime and every
//! later boot opens the existing file.

pub mod error;
pub mod keystore;
pub mod provision;

pub use error::StoreError;
pub use keystore::KeyStore;
pub use provision::{ensure_signing_key, Provisioned};
