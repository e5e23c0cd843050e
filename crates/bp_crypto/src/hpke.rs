//! Hybrid encryption pipeline
//!
//! One call per (recipient, attempt):
//!   ephemeral P-256 key pair → DER-export public half
//!   → 32-byte random salt
//!   → ECDH(ephemeral secret, recipient public)
//!   → HKDF-SHA256(salt, info = eph_der ‖ recipient_der) → AES-256 key
//!   → 12-byte random nonce → AES-256-GCM, AAD = nonce
//!
//! The ephemeral secret is consumed by the agreement and the derived key
//! is dropped (zeroized) before this function returns; neither is ever
//! visible to the caller. A failed attempt is never retried with the
//! same salt/nonce; the caller restarts from ephemeral generation.

use p256::PublicKey;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::aead;
use crate::error::CryptoError;
use crate::kdf;
use crate::keys::EphemeralKeyPair;

pub const SALT_LEN: usize = 32;

/// Per-(recipient, attempt) working state. Carries no secret material:
/// everything here goes into the envelope verbatim.
pub struct MessageContext {
    /// AES-256-GCM ciphertext with the 16-byte tag appended.
    pub ciphertext: Vec<u8>,
    /// The GCM nonce, which is also the additional authenticated data.
    pub aad: [u8; aead::NONCE_LEN],
    /// HKDF salt.
    pub salt: [u8; SALT_LEN],
    /// DER SubjectPublicKeyInfo of the ephemeral public key.
    pub ephemeral_pub_der: Vec<u8>,
}

/// Encrypt `plaintext` for one recipient with a fresh ephemeral key pair.
pub fn encrypt(
    recipient_public: &PublicKey,
    recipient_pub_der: &[u8],
    plaintext: &[u8],
) -> Result<MessageContext, CryptoError> {
    encrypt_with_ephemeral(
        EphemeralKeyPair::generate(),
        recipient_public,
        recipient_pub_der,
        plaintext,
    )
}

/// As [`encrypt`], with a caller-supplied ephemeral pair. Exists so test
/// vectors can pin the ephemeral secret; production always calls
/// [`encrypt`].
pub fn encrypt_with_ephemeral(
    ephemeral: EphemeralKeyPair,
    recipient_public: &PublicKey,
    recipient_pub_der: &[u8],
    plaintext: &[u8],
) -> Result<MessageContext, CryptoError> {
    let ephemeral_pub_der = ephemeral.public_key_der()?;

    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);

    // `agree` consumes the ephemeral pair; the shared secret lives only
    // until the key is derived.
    let shared = ephemeral.agree(recipient_public);
    let key = kdf::derive_message_key(
        shared.raw_secret_bytes(),
        &salt,
        &ephemeral_pub_der,
        recipient_pub_der,
    )?;
    drop(shared);

    let nonce = aead::generate_nonce();
    let ciphertext = aead::encrypt(&key, &nonce, plaintext)?;

    Ok(MessageContext {
        ciphertext,
        aad: nonce,
        salt,
        ephemeral_pub_der,
    })
}

/// Recipient-side inverse: rerun the agreement with the recipient's
/// static secret and the envelope's ephemeral public key, rederive the
/// AES key, decrypt. Used by the verifying endpoints and by tests.
pub fn decrypt(
    recipient_secret: &p256::SecretKey,
    ephemeral_pub_der: &[u8],
    salt: &[u8; SALT_LEN],
    aad: &[u8; aead::NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let ephemeral_public = crate::keys::public_key_from_der(ephemeral_pub_der)?;
    let recipient_pub_der = {
        use p256::pkcs8::EncodePublicKey;
        recipient_secret
            .public_key()
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyExport(e.to_string()))?
            .as_bytes()
            .to_vec()
    };
    let shared = p256::ecdh::diffie_hellman(
        recipient_secret.to_nonzero_scalar(),
        ephemeral_public.as_affine(),
    );
    let key = kdf::derive_message_key(
        shared.raw_secret_bytes(),
        salt,
        ephemeral_pub_der,
        &recipient_pub_der,
    )?;
    aead::decrypt(&key, aad, ciphertext)
}
