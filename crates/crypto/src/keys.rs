use rand::rngs::OsRng;
use relaybridge_core::PeerKey;
use sha2::{Digest, Sha256};
use thiserror::Error;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),
}

/// X25519 identity key pair.
///
/// The public half is the peer's address on the relay.
pub struct Keypair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self::from_secret_bytes(self.secret.as_bytes())
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl Keypair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Create from raw secret key bytes
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*secret);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Parse a secret key from 64 hex characters
    pub fn from_secret_hex(s: &str) -> Result<Self, KeyError> {
        let mut secret = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut secret)
            .map_err(|e| KeyError::InvalidSecretKey(e.to_string()))?;
        Ok(Self::from_secret_bytes(&secret))
    }

    /// Get the secret key as bytes
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Get the public key as the peer identity
    pub fn public_key(&self) -> PeerKey {
        PeerKey::from_bytes(self.public.to_bytes())
    }

    /// Perform Diffie-Hellman key exchange
    pub fn diffie_hellman(&self, their_public: &PeerKey) -> [u8; 32] {
        let their_public = X25519PublicKey::from(their_public.to_bytes());
        let shared = self.secret.diffie_hellman(&their_public);
        *shared.as_bytes()
    }
}

/// Hash data using SHA-256
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_restore_from_secret() {
        let kp = Keypair::generate();
        let restored = Keypair::from_secret_bytes(&kp.secret_key_bytes());
        assert_eq!(restored.public_key(), kp.public_key());
    }

    #[test]
    fn test_keypair_from_secret_hex() {
        let kp = Keypair::generate();
        let hex_secret = hex::encode(kp.secret_key_bytes());
        let restored = Keypair::from_secret_hex(&hex_secret).unwrap();
        assert_eq!(restored.public_key(), kp.public_key());
    }

    #[test]
    fn test_generated_keys_differ() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_diffie_hellman() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();

        let alice_shared = alice.diffie_hellman(&bob.public_key());
        let bob_shared = bob.diffie_hellman(&alice.public_key());

        assert_eq!(alice_shared, bob_shared);
    }

    #[test]
    fn test_debug_hides_secret() {
        let kp = Keypair::generate();
        let debug = format!("{:?}", kp);
        assert!(!debug.contains(&hex::encode(kp.secret_key_bytes())));
    }

    #[test]
    fn test_from_secret_hex_rejects_garbage() {
        assert!(Keypair::from_secret_hex("not hex").is_err());
        assert!(Keypair::from_secret_hex(&"ab".repeat(31)).is_err());
    }
}
