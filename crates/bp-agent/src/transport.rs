//! Network-facing operations behind a trait so the pipeline can be
//! driven against an in-memory transport in tests.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream, ToSocketAddrs};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::TransportError;

/// Byte the store answers with once it has accepted an envelope.
const ACK: u8 = b'A';

#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the raw DID document for `did`.
    async fn resolve(&self, did: &str) -> Result<Vec<u8>, TransportError>;

    /// Probe `endpoint` (`host:port`) and decide whether it is worth
    /// attempting a delivery.
    async fn check_reachable(&self, endpoint: &str) -> Result<(), TransportError>;

    /// Deliver `payload` to `endpoint` and wait for the ack byte.
    async fn deliver(&self, endpoint: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Publish the signing public key; failures are logged by the
    /// caller and never abort startup.
    async fn register(&self, endpoint: &str, payload: &[u8]) -> Result<(), TransportError>;
}

/// The registration endpoint is configured as bare `host:port`; give it
/// a scheme so the HTTP client accepts it. A full URL passes through.
fn registration_url(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

/// Production transport: HTTP against the DID registry, plain TCP with a
/// one-byte ack towards the stores.
pub struct HttpTransport {
    client: reqwest::Client,
    registry_url: String,
    probe_count: u32,
    probe_pacing: Duration,
    connect_timeout: Duration,
    ack_timeout: Duration,
}

impl HttpTransport {
    pub fn new(registry_url: String, probe_count: u32, probe_pacing: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            registry_url,
            probe_count,
            probe_pacing,
            connect_timeout: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// TCP connect with a bounded budget. The network task is a single
    /// loop; a connect left to the kernel's own timeout would stall
    /// every queued command behind it.
    async fn connect(
        &self,
        addr: impl ToSocketAddrs,
        label: &str,
    ) -> Result<TcpStream, TransportError> {
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::Unreachable(format!(
                "{label}: connect timed out"
            ))),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn resolve(&self, did: &str) -> Result<Vec<u8>, TransportError> {
        let url = format!("{}/dids/{}", self.registry_url.trim_end_matches('/'), did);
        debug!(%url, "resolving did document");
        let resp = self.client.get(&url).send().await?.error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn check_reachable(&self, endpoint: &str) -> Result<(), TransportError> {
        // DNS first; an endpoint that does not resolve is a hard failure.
        let mut addrs = lookup_host(endpoint)
            .await
            .map_err(|e| TransportError::Dns(format!("{endpoint}: {e}")))?;
        let addr = addrs
            .next()
            .ok_or_else(|| TransportError::Dns(format!("{endpoint}: no addresses")))?;

        // Mirror of the firmware's ping burst: a fixed number of paced
        // connect probes, any single success counts.
        for attempt in 0..self.probe_count {
            if attempt > 0 {
                tokio::time::sleep(self.probe_pacing).await;
            }
            match self.connect(addr, endpoint).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    debug!(%endpoint, attempt, error = %e, "probe failed");
                }
            }
        }
        Err(TransportError::Unreachable(endpoint.to_string()))
    }

    async fn deliver(&self, endpoint: &str, payload: &[u8]) -> Result<(), TransportError> {
        let mut stream = self.connect(endpoint, endpoint).await?;
        stream.write_all(payload).await?;
        stream.flush().await?;

        let mut ack = [0u8; 1];
        match timeout(self.ack_timeout, stream.read_exact(&mut ack)).await {
            Ok(Ok(_)) if ack[0] == ACK => Ok(()),
            Ok(Ok(_)) => Err(TransportError::AckTimeout(format!(
                "{endpoint}: unexpected ack byte 0x{:02x}",
                ack[0]
            ))),
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::AckTimeout(endpoint.to_string())),
        }
    }

    async fn register(&self, endpoint: &str, payload: &[u8]) -> Result<(), TransportError> {
        let resp = self
            .client
            .post(registration_url(endpoint))
            .header("content-type", "application/json")
            .body(payload.to_vec())
            .send()
            .await?;
        if let Err(e) = resp.error_for_status() {
            warn!(error = %e, "registration rejected");
            return Err(TransportError::Http(e));
        }
        Ok(())
    }
}
