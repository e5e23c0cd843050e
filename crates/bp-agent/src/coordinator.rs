//! Crypto task: resolves recipients, encrypts and signs readings, and
//! hands the sealed envelopes to the network task.
//!
//! One delivery cycle walks the recipient list in order. A failure for
//! one recipient (unresolvable DID, malformed document, crypto error,
//! unreachable store) skips that recipient and moves on; only a broken
//! channel to the network task ends the cycle early.
//!
//! Each command carries a fresh sequence number and the reply wait only
//! accepts the matching `seq`; a reply arriving after its recipient was
//! skipped is discarded instead of being consumed by the next
//! recipient's handshake, so per-recipient ordering survives timeouts
//! and cycle boundaries.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use bp_crypto::{hpke, DeviceSigningKey};
use bp_proto::did::DidDocument;
use bp_proto::envelope::{wall_clock_timestamp, SignedEnvelope};

use crate::channel::{recv_matching, send, NetCommand, NetCommandKind, NetEvent, NetEventKind};
use crate::config::AgentConfig;
use crate::error::TransportError;
use crate::telemetry::TelemetrySource;

/// Where the coordinator currently is inside a cycle. Indexes into the
/// configured recipient list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Resolving(usize),
    Encrypting(usize),
    Signing(usize),
    Sending(usize),
}

pub struct DeliveryCoordinator<T: TelemetrySource> {
    config: AgentConfig,
    signing_key: DeviceSigningKey,
    telemetry: T,
    commands: mpsc::Sender<NetCommand>,
    events: mpsc::Receiver<NetEvent>,
    phase: Phase,
    seq: u64,
}

impl<T: TelemetrySource> DeliveryCoordinator<T> {
    pub fn new(
        config: AgentConfig,
        signing_key: DeviceSigningKey,
        telemetry: T,
        commands: mpsc::Sender<NetCommand>,
        events: mpsc::Receiver<NetEvent>,
    ) -> Self {
        Self {
            config,
            signing_key,
            telemetry,
            commands,
            events,
            phase: Phase::Idle,
            seq: 0,
        }
    }

    fn enter(&mut self, phase: Phase) {
        if phase != self.phase {
            debug!(?phase, "phase transition");
            self.phase = phase;
        }
    }

    /// Send `kind` under a fresh sequence number and return it for the
    /// matching reply wait.
    async fn command(&mut self, kind: NetCommandKind) -> Result<u64, TransportError> {
        self.seq += 1;
        let seq = self.seq;
        send(&self.commands, NetCommand { seq, kind }).await?;
        Ok(seq)
    }

    /// Runs one cycle per trigger tick; returns once the trigger channel
    /// closes.
    pub async fn run(mut self, mut trigger: mpsc::Receiver<()>) -> Result<(), TransportError> {
        while trigger.recv().await.is_some() {
            self.run_cycle().await?;
        }
        Ok(())
    }

    /// One full walk over the recipient list.
    pub async fn run_cycle(&mut self) -> Result<(), TransportError> {
        let reading = self.telemetry.sample();
        debug!(len = reading.len(), "sampled telemetry");

        for index in 0..self.config.recipients.len() {
            let did = self.config.recipients[index].clone();
            if let Err(e) = self.deliver_to(index, &did, reading.as_bytes()).await {
                match e {
                    TransportError::ChannelClosed => {
                        self.enter(Phase::Idle);
                        return Err(TransportError::ChannelClosed);
                    }
                    other => warn!(%did, error = %other, "skipping recipient"),
                }
            }
        }
        self.enter(Phase::Idle);
        Ok(())
    }

    /// Resolve, verify reachability, then encrypt/sign/send with a
    /// bounded retry budget. Every attempt re-encrypts so retries never
    /// reuse an ephemeral key, salt, or nonce.
    async fn deliver_to(
        &mut self,
        index: usize,
        did: &str,
        plaintext: &[u8],
    ) -> Result<(), TransportError> {
        self.enter(Phase::Resolving(index));
        let seq = self
            .command(NetCommandKind::Resolve { did: did.to_string() })
            .await?;
        let document = match self.recv_event(seq).await? {
            NetEventKind::Document { bytes } => bytes,
            NetEventKind::ResolveFailed { did, reason } => {
                return Err(TransportError::ResolveFailed { did, reason });
            }
            other => {
                return Err(TransportError::ResolveFailed {
                    did: did.to_string(),
                    reason: format!("unexpected event {other:?}"),
                });
            }
        };

        let document = DidDocument::extract(&document).map_err(|e| {
            TransportError::ResolveFailed {
                did: did.to_string(),
                reason: format!("malformed did document: {e}"),
            }
        })?;
        let recipient_key = document.public_key().map_err(|e| {
            TransportError::ResolveFailed {
                did: did.to_string(),
                reason: format!("bad recipient key: {e}"),
            }
        })?;

        let seq = self
            .command(NetCommandKind::Endpoint {
                endpoint: document.service_endpoint.clone(),
            })
            .await?;
        match self.recv_event(seq).await? {
            NetEventKind::Ready => {}
            NetEventKind::Unreachable { endpoint } => {
                return Err(TransportError::Unreachable(endpoint));
            }
            other => {
                return Err(TransportError::Unreachable(format!(
                    "{}: unexpected event {other:?}",
                    document.service_endpoint
                )));
            }
        }

        let mut last_failure = String::from("no attempts made");
        for attempt in 1..=self.config.delivery_attempts.max(1) {
            self.enter(Phase::Encrypting(index));
            let context = hpke::encrypt(&recipient_key, &document.public_key_der, plaintext)
                .map_err(|e| TransportError::Prepare {
                    did: did.to_string(),
                    reason: format!("encryption failed: {e}"),
                })?;

            self.enter(Phase::Signing(index));
            let envelope = SignedEnvelope::seal(
                &context,
                &self.config.device_did,
                &wall_clock_timestamp(),
                &self.signing_key,
            )
            .map_err(|e| TransportError::Prepare {
                did: did.to_string(),
                reason: format!("signing failed: {e}"),
            })?;
            let bytes = envelope.to_bytes().map_err(|e| TransportError::Prepare {
                did: did.to_string(),
                reason: format!("envelope serialisation failed: {e}"),
            })?;

            self.enter(Phase::Sending(index));
            let seq = self.command(NetCommandKind::Payload { bytes }).await?;
            match self.recv_event(seq).await? {
                NetEventKind::Delivered => {
                    info!(%did, attempt, "reading delivered");
                    return Ok(());
                }
                NetEventKind::DeliveryFailed { reason } => {
                    warn!(%did, attempt, %reason, "delivery attempt failed");
                    last_failure = reason;
                }
                other => {
                    last_failure = format!("unexpected event {other:?}");
                }
            }
        }

        Err(TransportError::Delivery {
            did: did.to_string(),
            reason: format!("all attempts exhausted: {last_failure}"),
        })
    }

    async fn recv_event(&mut self, seq: u64) -> Result<NetEventKind, TransportError> {
        recv_matching(
            &mut self.events,
            seq,
            Duration::from_millis(self.config.recv_timeout_ms),
            self.config.recv_retries,
        )
        .await
    }
}
