//! Crypto↔network channel protocol.
//!
//! The firmware used two FreeRTOS message buffers carrying raw bytes; a
//! zero-length receive was retried in an unbounded loop. Here the two
//! directions are bounded `mpsc` channels carrying typed messages, and
//! every receive has a bounded timeout with a fixed retry budget;
//! exhaustion surfaces as `TransportError::ChannelTimeout` instead of a
//! stalled task.
//!
//! Every command carries a sequence number and the network task echoes
//! it on the reply. A reply that lands after its wait expired (the
//! recipient was already skipped) still sits in the queue; the matching
//! receive discards anything with a stale `seq`, so a late reply can
//! never be mistaken for the answer to a later recipient's command.
//!
//! Handshake per recipient (commands left, events right):
//!
//!   Resolve { did }        →
//!                          ← Document | ResolveFailed
//!   Endpoint { endpoint }  →   (DNS + bounded reachability probes)
//!                          ← Ready | Unreachable
//!   Payload { bytes }      →   (TCP send, one-byte ack)
//!                          ← Delivered | DeliveryFailed

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;

use crate::error::TransportError;

/// Crypto task → network task.
#[derive(Debug)]
pub struct NetCommand {
    /// Echoed on the reply; `Register` produces no reply and ignores it.
    pub seq: u64,
    pub kind: NetCommandKind,
}

#[derive(Debug)]
pub enum NetCommandKind {
    /// Resolve one recipient's DID document.
    Resolve { did: String },
    /// Announce the endpoint for the upcoming payload; the network task
    /// answers with the reachability verdict.
    Endpoint { endpoint: String },
    /// The signed envelope bytes for the last announced endpoint.
    Payload { bytes: Vec<u8> },
    /// Fire-and-forget publication of the signing public key to the
    /// registration endpoint. No event is produced for this command.
    Register { endpoint: String, payload: Vec<u8> },
}

/// Network task → crypto task.
#[derive(Debug)]
pub struct NetEvent {
    /// The `seq` of the command this replies to.
    pub seq: u64,
    pub kind: NetEventKind,
}

#[derive(Debug)]
pub enum NetEventKind {
    Document { bytes: Vec<u8> },
    ResolveFailed { did: String, reason: String },
    Ready,
    Unreachable { endpoint: String },
    Delivered,
    DeliveryFailed { reason: String },
}

/// Receive the reply to command `expected`, with a bounded per-wait
/// timeout retried `retries` times. Events carrying any other `seq` are
/// stale replies to already-skipped commands and are dropped (each drop
/// spends one retry slot, so even a burst of stale events stays
/// bounded).
pub async fn recv_matching(
    rx: &mut mpsc::Receiver<NetEvent>,
    expected: u64,
    wait: Duration,
    retries: u32,
) -> Result<NetEventKind, TransportError> {
    for _ in 0..retries.max(1) {
        match timeout(wait, rx.recv()).await {
            Ok(Some(event)) if event.seq == expected => return Ok(event.kind),
            Ok(Some(event)) => {
                debug!(seq = event.seq, expected, "dropping stale reply");
                continue;
            }
            Ok(None) => return Err(TransportError::ChannelClosed),
            Err(_) => continue,
        }
    }
    Err(TransportError::ChannelTimeout)
}

/// Send; a full channel blocks until the peer drains it, a closed one
/// reports the peer as gone.
pub async fn send<T>(tx: &mpsc::Sender<T>, msg: T) -> Result<(), TransportError> {
    tx.send(msg).await.map_err(|_| TransportError::ChannelClosed)
}
