use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{OsRng, RngCore};

use crate::errors::*;

/// Generate a new Ed25519 key pair
pub fn generate_keypair() -> ([u8; 32], [u8; 32]) {
    let mut rng = OsRng;
    let mut secret = [0u8; 32];
    rng.fill_bytes(&mut secret);

    let signing_key = SigningKey::from_bytes(&secret);
    let verifying_key = signing_key.verifying_key();

    (secret, verifying_key.to_bytes())
}

/// Random hex token of `len` bytes, used for enrollment secrets.
pub fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub(crate) fn decode_key(hex_str: &str, what: &str) -> Result<[u8; 32]> {
    let mut out = [0u8; 32];
    hex::decode_to_slice(hex_str, &mut out)
        .map_err(|e| IdentityError::InvalidCredentials(format!("{what}: {e}")))?;
    Ok(out)
}

pub(crate) fn signing_key_from_hex(hex_str: &str) -> Result<SigningKey> {
    Ok(SigningKey::from_bytes(&decode_key(hex_str, "private key")?))
}

pub(crate) fn sign_hex(key: &SigningKey, message: &[u8]) -> String {
    hex::encode(key.sign(message).to_bytes())
}

/// Verify a hex encoded Ed25519 signature against a hex encoded public key.
pub fn verify_signature(public_key_hex: &str, message: &[u8], signature_hex: &str) -> Result<()> {
    let key_bytes = decode_key(public_key_hex, "public key")?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| IdentityError::InvalidCredentials(format!("public key: {e}")))?;

    let mut sig_bytes = [0u8; 64];
    hex::decode_to_slice(signature_hex, &mut sig_bytes)
        .map_err(|_| IdentityError::InvalidSignature)?;
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key
        .verify(message, &signature)
        .map_err(|_| IdentityError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let (secret, public) = generate_keypair();
        let key = SigningKey::from_bytes(&secret);
        let sig = sign_hex(&key, b"proposal");

        assert!(verify_signature(&hex::encode(public), b"proposal", &sig).is_ok());
        assert!(matches!(
            verify_signature(&hex::encode(public), b"tampered", &sig),
            Err(IdentityError::InvalidSignature)
        ));
    }

    #[test]
    fn test_malformed_inputs() {
        let (_, public) = generate_keypair();
        assert!(verify_signature("zz", b"m", &"00".repeat(64)).is_err());
        assert!(matches!(
            verify_signature(&hex::encode(public), b"m", "abc"),
            Err(IdentityError::InvalidSignature)
        ));
    }

    #[test]
    fn test_random_token_length() {
        let a = random_token(16);
        assert_eq!(a.len(), 32);
        assert_ne!(a, random_token(16));
    }
}
