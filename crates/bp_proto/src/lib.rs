//! bp_proto — Wire types and serialisation for the BatteryPass telemetry agent
//!
//! Everything on the wire is JSON with binary fields base64-encoded.
//!
//! # Modules
//! - `did`      — DID-document key extraction (resolver output → validated key material)
//! - `envelope` — the signed telemetry envelope (what the cloud endpoint sees)
//! - `error`    — parse errors

pub mod did;
pub mod envelope;
pub mod error;

pub use did::DidDocument;
pub use envelope::SignedEnvelope;
pub use error::ParseError;
