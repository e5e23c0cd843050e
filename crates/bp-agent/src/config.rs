//! Agent configuration.
//!
//! Loaded from a JSON file given on the command line; every field has a
//! default so a partial file is enough. The recipient list plays the
//! role of the firmware's flash-stored verifiable credentials: one
//! entry per cloud/service party entitled to telemetry.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// This device's DID, carried (base64) in every envelope.
    pub device_did: String,
    /// Where the keystore lives.
    pub data_dir: PathBuf,
    /// Base URL of the DID registry used for resolution.
    pub registry_url: String,
    /// `host:port` (or full URL) receiving the one-time signing-key registration.
    pub registration_endpoint: String,
    /// DIDs of the telemetry recipients.
    pub recipients: Vec<String>,
    /// Seconds between delivery cycles (the firmware's RTC alarm period).
    pub cycle_interval_secs: u64,
    /// Capacity of each crypto↔network channel.
    pub channel_capacity: usize,
    /// Single bounded wait on a channel receive, in milliseconds.
    pub recv_timeout_ms: u64,
    /// How many timed-out waits are retried before the receive fails.
    pub recv_retries: u32,
    /// Per-recipient delivery attempts; every attempt re-encrypts.
    pub delivery_attempts: u32,
    /// Reachability probes per endpoint.
    pub probe_count: u32,
    /// Pause between probes, in milliseconds.
    pub probe_pacing_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device_did: "did:batterypass:bms.sn-987654321".into(),
            data_dir: PathBuf::from("/var/lib/bp-agent"),
            registry_url: "http://registry.batterypass.local:8443".into(),
            registration_endpoint: "oem.batterypass.local:9090".into(),
            recipients: vec!["did:batterypass:service.tuv-sued-42".into()],
            cycle_interval_secs: 3600,
            channel_capacity: 8,
            recv_timeout_ms: 1000,
            recv_retries: 10,
            delivery_attempts: 3,
            probe_count: 4,
            probe_pacing_ms: 100,
        }
    }
}

impl AgentConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
