//! # Symmetric codec
//!
//! Module dedicated to the authenticated encryption of opaque byte
//! strings. A ciphertext is a sealed box: a random 24-byte nonce
//! followed by the XChaCha20-Poly1305 output of the message under a
//! 32-byte key. Nonces are never reused across messages, enforced by
//! randomness rather than a counter.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};

use crate::{Error, Result};

/// The size of the symmetric keys, in bytes.
pub const KEY_SIZE: usize = 32;

/// The size of the nonce prefixing every ciphertext, in bytes.
pub const NONCE_SIZE: usize = 24;

/// Generates a fresh random key from the system entropy source.
pub fn generate_key() -> [u8; KEY_SIZE] {
    let mut key = [0; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}

/// Encrypts a message under the given key.
///
/// A fresh nonce is drawn for every message and prepended to the
/// sealed output.
pub fn encrypt(msg: &[u8], key: &[u8; KEY_SIZE]) -> Result<Vec<u8>> {
    let mut nonce = [0; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let sealed = cipher
        .encrypt(XNonce::from_slice(&nonce), msg)
        .map_err(|_| Error::EncryptionFailedError)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);

    Ok(out)
}

/// Decrypts a sealed message under the given key.
///
/// Fails when the input is shorter than a nonce or when the
/// authentication tag does not verify.
pub fn decrypt(msg: &[u8], key: &[u8; KEY_SIZE]) -> Result<Vec<u8>> {
    if msg.len() < NONCE_SIZE {
        return Err(Error::DecryptionFailedError);
    }

    let (nonce, sealed) = msg.split_at(NONCE_SIZE);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    cipher
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map_err(|_| Error::DecryptionFailedError)
}
