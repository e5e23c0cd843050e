use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Not a JSON document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),
}
