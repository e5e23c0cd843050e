//! Key derivation
//!
//! One function: HKDF-SHA256 from an ECDH shared secret to a 32-byte
//! AES-256 key. The info input binds the derived key to both parties'
//! DER-encoded public keys (ephemeral first, recipient second), so a key
//! derived for one recipient can never be confused with another's even
//! when two recipients publish the same point.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Derive the per-message AES-256 key.
///
/// `salt` is the fresh 32-byte random drawn for this attempt;
/// `info = ephemeral_pub_der ‖ recipient_pub_der`.
pub fn derive_message_key(
    shared_secret: &[u8],
    salt: &[u8; 32],
    ephemeral_pub_der: &[u8],
    recipient_pub_der: &[u8],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let mut info = Vec::with_capacity(ephemeral_pub_der.len() + recipient_pub_der.len());
    info.extend_from_slice(ephemeral_pub_der);
    info.extend_from_slice(recipient_pub_der);

    let hk = Hkdf::<Sha256>::new(Some(salt), shared_secret);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(&info, key.as_mut())
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let secret = [7u8; 32];
        let salt = [1u8; 32];
        let a = derive_message_key(&secret, &salt, b"eph-der", b"rec-der").unwrap();
        let b = derive_message_key(&secret, &salt, b"eph-der", b"rec-der").unwrap();
        assert_eq!(a.as_ref(), b.as_ref());
    }

    #[test]
    fn info_order_matters() {
        let secret = [7u8; 32];
        let salt = [1u8; 32];
        let a = derive_message_key(&secret, &salt, b"eph-der", b"rec-der").unwrap();
        let b = derive_message_key(&secret, &salt, b"rec-der", b"eph-der").unwrap();
        assert_ne!(a.as_ref(), b.as_ref());
    }

    #[test]
    fn salt_changes_key() {
        let secret = [7u8; 32];
        let a = derive_message_key(&secret, &[1u8; 32], b"e", b"r").unwrap();
        let b = derive_message_key(&secret, &[2u8; 32], b"e", b"r").unwrap();
        assert_ne!(a.as_ref(), b.as_ref());
    }
}
