use thiserror::Error;

/// Network-side failures. None of these ever halt the device: the
/// coordinator retries within its attempt budget, then skips the
/// recipient and finishes the cycle.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("DNS lookup failed for {0}")]
    Dns(String),

    #[error("Endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("DID resolution failed for {did}: {reason}")]
    ResolveFailed { did: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Send failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("No delivery acknowledgement from {0}")]
    AckTimeout(String),

    #[error("Envelope preparation failed for {did}: {reason}")]
    Prepare { did: String, reason: String },

    #[error("Delivery to {did} failed: {reason}")]
    Delivery { did: String, reason: String },

    #[error("Channel receive timed out after retries")]
    ChannelTimeout,

    #[error("Peer task is gone (channel closed)")]
    ChannelClosed,
}
