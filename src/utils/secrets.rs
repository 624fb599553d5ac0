//! At-rest encryption for stored second-factor secrets.
//!
//! ChaCha20-Poly1305 with the owning identity id bound as AAD, so a
//! ciphertext copied onto another row fails to decrypt. Layout is
//! `nonce (12 bytes) || ciphertext`.

use anyhow::Result;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use uuid::Uuid;

const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; 32],
}

impl SecretCipher {
    /// Build a cipher from a 32-byte key.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Build a cipher from a hex-encoded 32-byte key (the config format).
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key)
            .map_err(|e| anyhow::anyhow!("Encryption key is not valid hex: {}", e))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("Encryption key must be exactly 32 bytes"))?;
        Ok(Self::new(key))
    }

    pub fn encrypt(&self, plaintext: &[u8], identity_id: Uuid) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let aad = aad_for(identity_id);
        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|e| anyhow::anyhow!("Encryption failure: {}", e))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, data: &[u8], identity_id: Uuid) -> Result<Vec<u8>> {
        if data.len() < NONCE_LEN {
            return Err(anyhow::anyhow!("Ciphertext too short"));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));

        let aad = aad_for(identity_id);
        cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|e| anyhow::anyhow!("Decryption failure: {}", e))
    }
}

fn aad_for(identity_id: Uuid) -> Vec<u8> {
    format!("totp-secret:v1|{}", identity_id).into_bytes()
}
