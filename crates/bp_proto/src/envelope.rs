//! Signed telemetry envelope — what the cloud endpoint sees.
//!
//! One JSON object per recipient, all binary fields base64. The field
//! order is load-bearing: the ECDSA signature covers the compact JSON
//! serialisation of the first six fields exactly as they are emitted
//! here, and verifiers must rebuild that serialisation byte-for-byte
//! (excluding `signature`) to recompute the hash.
//!
//!   { ciphertext, aad, salt, did, eph_pub, timestamp, signature }
//!
//! - `aad` is the GCM nonce (it is authenticated, not encrypted)
//! - `did` is the *sender's* device DID, so the endpoint knows which
//!   registered signing key to verify against
//! - `eph_pub` is the DER ephemeral public key for the recipient's ECDH
//! - `timestamp` is the 19-byte `YYYY-MM-DD HH:MM:SS` wall-clock string

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use bp_crypto::error::CryptoError;
use bp_crypto::keys::{self, DeviceSigningKey};
use bp_crypto::MessageContext;

use crate::error::ParseError;

/// Wall-clock timestamp in the fixed 19-byte envelope format.
pub fn wall_clock_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// The six fields the signature covers, in emission order. serde_json
/// serialises struct fields in declaration order, which makes
/// `serde_json::to_vec` of this struct the canonical byte string.
#[derive(Serialize)]
struct CanonicalFields<'a> {
    ciphertext: &'a str,
    aad: &'a str,
    salt: &'a str,
    did: &'a str,
    eph_pub: &'a str,
    timestamp: &'a str,
}

/// Final transmissible envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub ciphertext: String,
    pub aad: String,
    pub salt: String,
    pub did: String,
    pub eph_pub: String,
    pub timestamp: String,
    pub signature: String,
}

impl SignedEnvelope {
    /// Build and sign the envelope for one recipient.
    ///
    /// The canonical six-field JSON is hashed with SHA-256 and signed
    /// with the device's long-term ECDSA key; the base64 raw signature
    /// is appended as the final field. The signature never covers
    /// itself.
    pub fn seal(
        msg: &MessageContext,
        device_did: &str,
        timestamp: &str,
        signing_key: &DeviceSigningKey,
    ) -> Result<Self, CryptoError> {
        let ciphertext = STANDARD.encode(&msg.ciphertext);
        let aad = STANDARD.encode(msg.aad);
        let salt = STANDARD.encode(msg.salt);
        let did = STANDARD.encode(device_did.as_bytes());
        let eph_pub = STANDARD.encode(&msg.ephemeral_pub_der);
        let timestamp = STANDARD.encode(timestamp.as_bytes());

        let canonical = CanonicalFields {
            ciphertext: &ciphertext,
            aad: &aad,
            salt: &salt,
            did: &did,
            eph_pub: &eph_pub,
            timestamp: &timestamp,
        };
        let canonical_bytes = serde_json::to_vec(&canonical)
            .map_err(|e| CryptoError::Serialisation(e.to_string()))?;
        let digest: [u8; 32] = Sha256::digest(&canonical_bytes).into();
        let signature = signing_key.sign_digest(&digest)?;

        Ok(Self {
            ciphertext,
            aad,
            salt,
            did,
            eph_pub,
            timestamp,
            signature: STANDARD.encode(signature),
        })
    }

    /// Recompute the canonical hash (signature excluded) and check the
    /// signature against the given DER public key.
    pub fn verify(&self, signer_public_key_der: &[u8]) -> Result<(), CryptoError> {
        let canonical = CanonicalFields {
            ciphertext: &self.ciphertext,
            aad: &self.aad,
            salt: &self.salt,
            did: &self.did,
            eph_pub: &self.eph_pub,
            timestamp: &self.timestamp,
        };
        let canonical_bytes = serde_json::to_vec(&canonical)
            .map_err(|e| CryptoError::Serialisation(e.to_string()))?;
        let digest: [u8; 32] = Sha256::digest(&canonical_bytes).into();
        let signature = STANDARD.decode(&self.signature)?;
        keys::verify_digest(signer_public_key_der, &digest, &signature)
    }

    /// Serialise for transmission (compact JSON).
    pub fn to_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        serde_json::to_vec(self).map_err(|e| CryptoError::Serialisation(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The sender DID, decoded from its base64 envelope form.
    pub fn sender_did(&self) -> Result<String, ParseError> {
        let bytes = STANDARD.decode(&self.did)?;
        String::from_utf8(bytes)
            .map_err(|_| ParseError::InvalidEnvelope("did is not valid UTF-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::pkcs8::EncodePublicKey;
    use p256::SecretKey;
    use rand::rngs::OsRng;

    fn sealed_envelope() -> (SignedEnvelope, DeviceSigningKey) {
        let signing_key = DeviceSigningKey::generate();
        let recipient = SecretKey::random(&mut OsRng);
        let recipient_der = recipient
            .public_key()
            .to_public_key_der()
            .unwrap()
            .as_bytes()
            .to_vec();
        let msg = bp_crypto::hpke::encrypt(
            &recipient.public_key(),
            &recipient_der,
            b"cycles=200",
        )
        .unwrap();
        let env = SignedEnvelope::seal(
            &msg,
            "did:batterypass:bms.sn-987654321",
            "2025-07-04 07:45:00",
            &signing_key,
        )
        .unwrap();
        (env, signing_key)
    }

    #[test]
    fn seal_then_verify() {
        let (env, key) = sealed_envelope();
        env.verify(&key.public_key_der().unwrap()).unwrap();
        assert_eq!(env.sender_did().unwrap(), "did:batterypass:bms.sn-987654321");
    }

    #[test]
    fn field_order_is_stable_on_the_wire() {
        let (env, _) = sealed_envelope();
        let wire = String::from_utf8(env.to_bytes().unwrap()).unwrap();
        let positions: Vec<usize> = ["ciphertext", "aad", "salt", "did", "eph_pub", "timestamp", "signature"]
            .iter()
            .map(|f| wire.find(&format!("\"{f}\"")).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn any_field_mutation_breaks_the_signature() {
        let (env, key) = sealed_envelope();
        let pub_der = key.public_key_der().unwrap();

        let mutate = |f: &dyn Fn(&mut SignedEnvelope)| {
            let mut e = env.clone();
            f(&mut e);
            e
        };

        let mutated = [
            mutate(&|e| flip_field(&mut e.ciphertext)),
            mutate(&|e| flip_field(&mut e.aad)),
            mutate(&|e| flip_field(&mut e.salt)),
            mutate(&|e| flip_field(&mut e.did)),
            mutate(&|e| flip_field(&mut e.eph_pub)),
            mutate(&|e| flip_field(&mut e.timestamp)),
        ];
        for (i, e) in mutated.iter().enumerate() {
            assert!(e.verify(&pub_der).is_err(), "field {i} mutation went undetected");
        }
        // Unmodified envelope still verifies.
        env.verify(&pub_der).unwrap();
    }

    /// Flip one byte of the *decoded* field content and re-encode, so the
    /// mutation survives base64 round-tripping.
    fn flip_field(field: &mut String) {
        let mut raw = STANDARD.decode(field.as_bytes()).unwrap();
        raw[0] ^= 0x01;
        *field = STANDARD.encode(raw);
    }

    #[test]
    fn envelope_roundtrips_through_json() {
        let (env, key) = sealed_envelope();
        let restored = SignedEnvelope::from_bytes(&env.to_bytes().unwrap()).unwrap();
        restored.verify(&key.public_key_der().unwrap()).unwrap();
    }
}
