use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use relaybridge_core::PeerKey;
use thiserror::Error;

use crate::keys::{hash, Keypair};

/// Nonce prefix length of a sealed payload
pub const NONCE_LEN: usize = 12;

/// Bytes a sealed payload adds on top of the plaintext (nonce + tag)
pub const SEAL_OVERHEAD: usize = NONCE_LEN + 16;

#[derive(Error, Debug)]
pub enum EncryptError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid key")]
    InvalidKey,
    #[error("Ciphertext too short")]
    CiphertextTooShort,
}

fn cipher_for(local: &Keypair, remote: &PeerKey) -> Result<ChaCha20Poly1305, EncryptError> {
    let shared_secret = local.diffie_hellman(remote);
    let symmetric_key = hash(&shared_secret);
    ChaCha20Poly1305::new_from_slice(&symmetric_key).map_err(|_| EncryptError::InvalidKey)
}

/// Seal a payload for `recipient` using ECDH + ChaCha20-Poly1305
///
/// 1. X25519 Diffie-Hellman between our secret and their public key
/// 2. SHA-256 of the shared secret as the symmetric key
/// 3. Random 12-byte nonce prepended to the ciphertext
///
/// An empty plaintext still yields `SEAL_OVERHEAD` bytes.
pub fn seal(recipient: &PeerKey, sender: &Keypair, plaintext: &[u8]) -> Result<Vec<u8>, EncryptError> {
    let cipher = cipher_for(sender, recipient)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EncryptError::EncryptionFailed)?;

    let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Open a payload sealed by `sender` for us
pub fn open(sender: &PeerKey, recipient: &Keypair, sealed: &[u8]) -> Result<Vec<u8>, EncryptError> {
    if sealed.len() < SEAL_OVERHEAD {
        return Err(EncryptError::CiphertextTooShort);
    }

    let cipher = cipher_for(recipient, sender)?;
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| EncryptError::DecryptionFailed)
}
