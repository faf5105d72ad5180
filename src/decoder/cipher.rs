//! XTEA stream decryption
//!
//! Firmware may encrypt the outgoing byte stream in 8-byte blocks with XTEA
//! (64 rounds, big-endian words). The 16-byte key is the truncated SHA-1
//! digest of a pass-phrase shared between firmware build and decoder.
//!
//! The block function comes from the RustCrypto `xtea` crate, which loads key
//! and block words little-endian. Every 32-bit word is reversed on the way in
//! and out so the wire keeps the big-endian word order.

use sha1::{Digest, Sha1};
use std::sync::Arc;
use xtea::cipher::{Block, BlockCipherDecrypt, BlockCipherEncrypt, KeyInit};

/// Pass-phrase meaning "stream is not encrypted"
pub const NO_ENCRYPTION: &str = "none";

/// XTEA block size in bytes
pub const BLOCK_SIZE: usize = 8;

/// Derive the 16-byte key from a pass-phrase, `None` when encryption is off
pub fn derive_key(passphrase: &str) -> Option<[u8; 16]> {
    if passphrase.is_empty() || passphrase == NO_ENCRYPTION {
        return None;
    }
    let digest = Sha1::digest(passphrase.as_bytes());
    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    Some(key)
}

/// Lowercase hex rendering of a key
pub fn key_hex(key: &[u8; 16]) -> String {
    key.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Reverse the bytes of every 32-bit word
fn swap_words(bytes: &mut [u8]) {
    for word in bytes.chunks_exact_mut(4) {
        word.reverse();
    }
}

/// XTEA block cipher with big-endian word order
#[derive(Clone)]
pub struct Xtea {
    inner: Arc<xtea::Xtea>,
}

impl std::fmt::Debug for Xtea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Xtea { .. }")
    }
}

impl Xtea {
    /// Create a cipher from a raw 16-byte key
    pub fn new(key: &[u8; 16]) -> Self {
        let mut words = *key;
        swap_words(&mut words);
        Self {
            inner: Arc::new(xtea::Xtea::new(&words.into())),
        }
    }

    /// Create a cipher from a pass-phrase, `None` when encryption is off
    pub fn from_passphrase(passphrase: &str) -> Option<Self> {
        derive_key(passphrase).map(|key| Self::new(&key))
    }

    fn load(block: &[u8; BLOCK_SIZE]) -> Block<xtea::Xtea> {
        let mut words = *block;
        swap_words(&mut words);
        words.into()
    }

    fn store(block: &mut [u8; BLOCK_SIZE], words: &Block<xtea::Xtea>) {
        block.copy_from_slice(words);
        swap_words(block);
    }

    /// Encrypt one block in place
    pub fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let mut words = Self::load(block);
        self.inner.encrypt_block(&mut words);
        Self::store(block, &words);
    }

    /// Decrypt one block in place
    pub fn decrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let mut words = Self::load(block);
        self.inner.decrypt_block(&mut words);
        Self::store(block, &words);
    }

    /// Encrypt all complete blocks of `data`; a trailing partial block is left as is
    pub fn encrypt(&self, data: &mut [u8]) {
        for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
            if let Ok(block) = <&mut [u8; BLOCK_SIZE]>::try_from(chunk) {
                self.encrypt_block(block);
            }
        }
    }
}

/// Decrypts a byte stream block by block, holding back incomplete blocks
#[derive(Debug)]
pub struct BlockDecryptor {
    cipher: Xtea,
    pending: Vec<u8>,
}

impl BlockDecryptor {
    /// Create a decryptor for `cipher`
    pub fn new(cipher: Xtea) -> Self {
        Self {
            cipher,
            pending: Vec::with_capacity(BLOCK_SIZE),
        }
    }

    /// Decrypt what is complete of `pending + bytes` and append it to `out`
    pub fn push(&mut self, bytes: &[u8], out: &mut Vec<u8>) {
        self.pending.extend_from_slice(bytes);
        let complete = self.pending.len() - self.pending.len() % BLOCK_SIZE;
        for chunk in self.pending[..complete].chunks_exact(BLOCK_SIZE) {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            self.cipher.decrypt_block(&mut block);
            out.extend_from_slice(&block);
        }
        self.pending.drain(..complete);
    }

    /// Bytes waiting for the rest of their block
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
