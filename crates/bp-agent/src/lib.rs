//! bp-agent — the BatteryPass telemetry delivery service
//!
//! Two long-lived tasks coordinated over bounded channels, mirroring the
//! firmware's crypto/network thread split:
//!
//! - the **delivery task** ([`coordinator`]) owns all cryptographic
//!   state and walks the per-recipient pipeline
//!   resolve → encrypt → sign → send;
//! - the **network task** ([`net`]) owns the transport (DID resolution,
//!   reachability probing, TCP delivery) and never sees key material;
//!   only derived byte strings cross the channel boundary.
//!
//! A third, one-shot provisioning step runs at boot before either loop
//! starts (see `bp_store::provision`).

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod net;
pub mod telemetry;
pub mod transport;

pub use config::AgentConfig;
pub use coordinator::DeliveryCoordinator;
pub use error::TransportError;
