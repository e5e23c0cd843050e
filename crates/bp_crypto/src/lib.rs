//! bp_crypto — BatteryPass telemetry agent cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited RustCrypto crates.
//! - Secret material (ephemeral scalars, derived AES keys, the signing
//!   key) is zeroized on drop and never crosses a task boundary.
//! - Fixed suite: P-256 for key agreement and signatures, HKDF-SHA256
//!   for derivation, AES-256-GCM for payload encryption.
//!
//! # Module layout
//! - `keys`  — long-term ECDSA signing key + per-message ephemeral ECDH keys
//! - `kdf`   — HKDF-SHA256 message-key derivation with DER context binding
//! - `aead`  — AES-256-GCM encrypt/decrypt, AAD = nonce
//! - `hpke`  — the hybrid pipeline: one call per (recipient, attempt)
//! - `error` — unified error type

pub mod aead;
pub mod error;
pub mod hpke;
pub mod kdf;
pub mod keys;

pub use error::CryptoError;
pub use hpke::MessageContext;
pub use keys::DeviceSigningKey;
