//! Meshtastic channel encryption.
//!
//! Packets on the air carry an encoded `Data` encrypted with AES-CTR under
//! the channel key. The 128-bit counter block is the packet id (u64 LE),
//! then the sender's node number (u32 LE), then four zero bytes. Receivers
//! pick the key to try from a one-byte channel hash.

use ctr::cipher::{KeyIvInit, StreamCipher};
use thiserror::Error;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

#[derive(Debug, Error, PartialEq)]
pub enum CryptoError {
    #[error("channel key must be 16 or 32 bytes, got {0}")]
    KeyLength(usize),
}

fn xor_all(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// One-byte channel hash: XOR of the name bytes with XOR of the key bytes.
pub fn channel_hash(name: &str, key: &[u8]) -> u8 {
    xor_all(name.as_bytes()) ^ xor_all(key)
}

fn nonce(packet_id: u32, from: u32) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&(packet_id as u64).to_le_bytes());
    iv[8..12].copy_from_slice(&from.to_le_bytes());
    iv
}

/// A named channel and its key.
#[derive(Clone)]
pub struct ChannelKey {
    key: Vec<u8>,
    hash: u8,
}

impl std::fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelKey")
            .field("key_len", &self.key.len())
            .field("hash", &self.hash)
            .finish()
    }
}

impl ChannelKey {
    pub fn new(channel: &str, key: Vec<u8>) -> Result<Self, CryptoError> {
        if key.len() != 16 && key.len() != 32 {
            return Err(CryptoError::KeyLength(key.len()));
        }
        Ok(ChannelKey {
            hash: channel_hash(channel, &key),
            key,
        })
    }

    pub fn hash(&self) -> u8 {
        self.hash
    }

    /// Encrypt or decrypt `data`; CTR mode is its own inverse.
    pub fn crypt(&self, packet_id: u32, from: u32, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let iv = nonce(packet_id, from);
        let mut out = data.to_vec();
        match self.key.len() {
            16 => Aes128Ctr::new_from_slices(&self.key, &iv)
                .map_err(|_| CryptoError::KeyLength(self.key.len()))?
                .apply_keystream(&mut out),
            32 => Aes256Ctr::new_from_slices(&self.key, &iv)
                .map_err(|_| CryptoError::KeyLength(self.key.len()))?
                .apply_keystream(&mut out),
            n => return Err(CryptoError::KeyLength(n)),
        }
        Ok(out)
    }
}
