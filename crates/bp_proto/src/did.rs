//! DID-document key extraction
//!
//! A resolver hands us the raw document bytes for one recipient. We need
//! exactly two things out of it:
//!   - `verificationMethod.publicKeyMultibase` — base64 of the DER
//!     SubjectPublicKeyInfo of the recipient's P-256 key
//!   - `service[0].serviceEndpoint` — where the envelope goes
//!
//! Anything missing or undecodable is a hard [`ParseError`]; a document
//! that fails extraction contributes no recipient slot; keys are never
//! silently zero-filled.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use p256::PublicKey;
use serde_json::Value;

use crate::error::ParseError;

/// One resolved recipient: validated key material plus the delivery
/// endpoint. Lives for one delivery cycle.
#[derive(Debug, Clone)]
pub struct DidDocument {
    /// `host:port` (or URL) taken from the first service entry.
    pub service_endpoint: String,
    /// Uncompressed P-256 point (0x04 ‖ X ‖ Y).
    pub public_key: [u8; 65],
    /// DER SubjectPublicKeyInfo as it appeared in the document; retained
    /// because the key derivation binds to these exact bytes.
    pub public_key_der: Vec<u8>,
}

impl DidDocument {
    /// Parse and validate raw document bytes. Pure; no side effects.
    pub fn extract(doc: &[u8]) -> Result<Self, ParseError> {
        let root: Value = serde_json::from_slice(doc)?;

        let multibase = root
            .get("verificationMethod")
            .and_then(|vm| vm.get("publicKeyMultibase"))
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingField("verificationMethod.publicKeyMultibase"))?;

        let service_endpoint = root
            .get("service")
            .and_then(Value::as_array)
            .and_then(|s| s.first())
            .and_then(|s| s.get("serviceEndpoint"))
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingField("service[0].serviceEndpoint"))?
            .to_string();

        let public_key_der = STANDARD.decode(multibase)?;
        let point = decode_public_key(&public_key_der)?;

        Ok(Self { service_endpoint, public_key: point, public_key_der })
    }

    /// The validated key as a curve point, ready for ECDH.
    pub fn public_key(&self) -> Result<PublicKey, ParseError> {
        bp_crypto::keys::public_key_from_der(&self.public_key_der)
            .map_err(|e| ParseError::InvalidKey(e.to_string()))
    }
}

/// DER SPKI → uncompressed point, rejecting anything not on P-256.
fn decode_public_key(der: &[u8]) -> Result<[u8; 65], ParseError> {
    use p256::elliptic_curve::sec1::ToEncodedPoint;
    let public = bp_crypto::keys::public_key_from_der(der)
        .map_err(|e| ParseError::InvalidKey(e.to_string()))?;
    let encoded = public.to_encoded_point(false);
    let bytes = encoded.as_bytes();
    if bytes.len() != 65 {
        return Err(ParseError::InvalidKey(format!(
            "expected 65-byte uncompressed point, got {}",
            bytes.len()
        )));
    }
    let mut out = [0u8; 65];
    out.copy_from_slice(bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::pkcs8::EncodePublicKey;
    use p256::SecretKey;
    use rand::rngs::OsRng;

    fn sample_document(endpoint: &str) -> (Vec<u8>, SecretKey) {
        let secret = SecretKey::random(&mut OsRng);
        let der = secret.public_key().to_public_key_der().unwrap();
        let doc = serde_json::json!({
            "id": "did:batterypass:cloud.store-1",
            "verificationMethod": {
                "publicKeyMultibase": STANDARD.encode(der.as_bytes()),
            },
            "service": [
                { "serviceEndpoint": endpoint }
            ]
        });
        (serde_json::to_vec(&doc).unwrap(), secret)
    }

    #[test]
    fn extracts_endpoint_and_key() {
        let (doc, secret) = sample_document("store.example:9090");
        let did = DidDocument::extract(&doc).unwrap();
        assert_eq!(did.service_endpoint, "store.example:9090");
        assert_eq!(did.public_key[0], 0x04);
        assert_eq!(did.public_key().unwrap(), secret.public_key());
    }

    #[test]
    fn missing_verification_method_is_parse_error() {
        let doc = br#"{"service":[{"serviceEndpoint":"store.example:9090"}]}"#;
        assert!(matches!(
            DidDocument::extract(doc),
            Err(ParseError::MissingField(_))
        ));
    }

    #[test]
    fn missing_service_is_parse_error() {
        let (doc, _) = sample_document("store.example:9090");
        let mut root: Value = serde_json::from_slice(&doc).unwrap();
        root.as_object_mut().unwrap().remove("service");
        let doc = serde_json::to_vec(&root).unwrap();
        assert!(matches!(
            DidDocument::extract(&doc),
            Err(ParseError::MissingField("service[0].serviceEndpoint"))
        ));
    }

    #[test]
    fn garbage_key_is_invalid_key() {
        let doc = serde_json::json!({
            "verificationMethod": { "publicKeyMultibase": STANDARD.encode(b"not a DER key") },
            "service": [ { "serviceEndpoint": "store.example:9090" } ]
        });
        let doc = serde_json::to_vec(&doc).unwrap();
        assert!(matches!(
            DidDocument::extract(&doc),
            Err(ParseError::InvalidKey(_))
        ));
    }

    #[test]
    fn structurally_mutated_documents_never_panic() {
        let (doc, _) = sample_document("store.example:9090");
        let root: Value = serde_json::from_slice(&doc).unwrap();

        let mutations: Vec<Value> = vec![
            serde_json::json!({}),
            serde_json::json!(null),
            serde_json::json!([]),
            serde_json::json!({"verificationMethod": {}}),
            serde_json::json!({"verificationMethod": null, "service": null}),
            serde_json::json!({"verificationMethod": {"publicKeyMultibase": 42}}),
            serde_json::json!({"verificationMethod": {"publicKeyMultibase": "!!!"},
                               "service": [{"serviceEndpoint": "x:1"}]}),
            serde_json::json!({"verificationMethod": {"publicKeyMultibase": ""},
                               "service": [{"serviceEndpoint": "x:1"}]}),
            {
                let mut m = root.clone();
                m["service"] = serde_json::json!([]);
                m
            },
            {
                let mut m = root.clone();
                m["service"][0] = serde_json::json!({"type": "no endpoint here"});
                m
            },
            {
                let mut m = root;
                m["verificationMethod"]["publicKeyMultibase"] =
                    Value::String(STANDARD.encode([0u8; 65]));
                m
            },
        ];
        assert!(mutations.len() >= 10);

        for (i, m) in mutations.iter().enumerate() {
            let bytes = serde_json::to_vec(m).unwrap();
            assert!(
                DidDocument::extract(&bytes).is_err(),
                "mutation {i} unexpectedly parsed"
            );
        }

        // Not even valid JSON.
        assert!(DidDocument::extract(b"{ truncated").is_err());
    }
}
