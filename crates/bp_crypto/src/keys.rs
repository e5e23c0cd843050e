//! Key material
//!
//! Each *device* has one long-term `DeviceSigningKey` (ECDSA P-256),
//! persisted once by the keystore and read-only afterwards.
//! Each *(recipient, attempt)* gets one `EphemeralKeyPair` (ECDH P-256)
//! that lives exactly as long as one shared-secret derivation.
//!
//! Public keys travel as DER SubjectPublicKeyInfo; signatures as raw
//! 64-byte r‖s, matching what the verifying endpoints expect.

use p256::ecdh::SharedSecret;
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Long-term device identity key (ECDSA P-256). The secret scalar is
/// zeroized when the key is dropped.
pub struct DeviceSigningKey {
    secret: SecretKey,
}

impl DeviceSigningKey {
    pub fn generate() -> Self {
        Self { secret: SecretKey::random(&mut OsRng) }
    }

    /// Load from a PKCS#8 DER blob produced by [`to_pkcs8_der`](Self::to_pkcs8_der).
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_pkcs8_der(der)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { secret })
    }

    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let doc = self
            .secret
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeyExport(e.to_string()))?;
        Ok(Zeroizing::new(doc.as_bytes().to_vec()))
    }

    /// DER SubjectPublicKeyInfo of the public half, as published to the
    /// registration endpoint.
    pub fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        let doc = self
            .secret
            .public_key()
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyExport(e.to_string()))?;
        Ok(doc.as_bytes().to_vec())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from(&SigningKey::from(&self.secret))
    }

    /// Sign a precomputed SHA-256 digest; returns the raw 64-byte r‖s
    /// signature.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<[u8; 64], CryptoError> {
        let signing_key = SigningKey::from(&self.secret);
        let signature: Signature = signing_key
            .sign_prehash(digest)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        Ok(signature.to_bytes().into())
    }
}

/// Verify a raw 64-byte signature over a SHA-256 digest against a DER
/// SubjectPublicKeyInfo public key.
pub fn verify_digest(
    public_key_der: &[u8],
    digest: &[u8; 32],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let public = PublicKey::from_public_key_der(public_key_der)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let signature = Signature::from_slice(signature)
        .map_err(|_| CryptoError::SignatureVerification)?;
    VerifyingKey::from(&public)
        .verify_prehash(digest, &signature)
        .map_err(|_| CryptoError::SignatureVerification)
}

/// One-shot ECDH key pair. Consumed by [`agree`](Self::agree); the
/// secret scalar is zeroized on drop.
pub struct EphemeralKeyPair {
    secret: SecretKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        Self { secret: SecretKey::random(&mut OsRng) }
    }

    /// Build from a caller-supplied secret. Test vectors only; production
    /// paths always go through [`generate`](Self::generate).
    pub fn from_secret(secret: SecretKey) -> Self {
        Self { secret }
    }

    /// DER SubjectPublicKeyInfo of the ephemeral public key, carried in
    /// the envelope so the recipient can rerun the agreement.
    pub fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        let doc = self
            .secret
            .public_key()
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyExport(e.to_string()))?;
        Ok(doc.as_bytes().to_vec())
    }

    /// ECDH with the recipient's static public key. Consumes the pair so
    /// the ephemeral secret cannot outlive the derivation.
    pub fn agree(self, recipient: &PublicKey) -> SharedSecret {
        p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), recipient.as_affine())
    }
}

/// Parse a DER SubjectPublicKeyInfo into a P-256 public key, rejecting
/// anything that is not a valid point on the curve.
pub fn public_key_from_der(der: &[u8]) -> Result<PublicKey, CryptoError> {
    PublicKey::from_public_key_der(der).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    #[test]
    fn sign_verify_roundtrip() {
        let key = DeviceSigningKey::generate();
        let digest: [u8; 32] = Sha256::digest(b"telemetry payload").into();
        let sig = key.sign_digest(&digest).unwrap();
        let pub_der = key.public_key_der().unwrap();
        verify_digest(&pub_der, &digest, &sig).unwrap();
    }

    #[test]
    fn rejects_signature_from_other_key() {
        let key = DeviceSigningKey::generate();
        let other = DeviceSigningKey::generate();
        let digest: [u8; 32] = Sha256::digest(b"telemetry payload").into();
        let sig = key.sign_digest(&digest).unwrap();
        let err = verify_digest(&other.public_key_der().unwrap(), &digest, &sig);
        assert!(matches!(err, Err(CryptoError::SignatureVerification)));
    }

    #[test]
    fn pkcs8_roundtrip_preserves_public_key() {
        let key = DeviceSigningKey::generate();
        let der = key.to_pkcs8_der().unwrap();
        let restored = DeviceSigningKey::from_pkcs8_der(&der).unwrap();
        assert_eq!(
            key.public_key_der().unwrap(),
            restored.public_key_der().unwrap()
        );
    }

    #[test]
    fn ecdh_agreement_is_symmetric() {
        let a = EphemeralKeyPair::generate();
        let b_secret = SecretKey::random(&mut rand::rngs::OsRng);
        let b_public = b_secret.public_key();
        let a_public_der = a.public_key_der().unwrap();

        let shared_a = a.agree(&b_public);
        let a_public = public_key_from_der(&a_public_der).unwrap();
        let shared_b =
            p256::ecdh::diffie_hellman(b_secret.to_nonzero_scalar(), a_public.as_affine());
        assert_eq!(
            shared_a.raw_secret_bytes().as_slice(),
            shared_b.raw_secret_bytes().as_slice()
        );
    }
}
