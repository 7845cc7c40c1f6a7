//! # Credential record
//!
//! Module dedicated to the in-memory representation of one account:
//! its public identity, its sealed material, and, once unlocked, the
//! 32-byte working key and the live secret bundle. A record is
//! *locked* while its working key is all zeros, and *connected*
//! while its secret bundle is fully populated.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{codec, Error, Result};

/// The name of the key slot every live record carries. It is created
/// when the record is added and can never be removed.
pub const MAIN_KEY_SLOT: &str = "main";

/// The secret bundle of one account.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Zeroize)]
pub struct Secret {
    /// The upstream API refresh token pair, in `uid:refresh` form.
    #[serde(rename = "APIToken")]
    pub api_token: String,

    /// The raw mailbox passphrase bytes.
    #[serde(rename = "MailboxPassword", with = "crate::serde::base64_bytes")]
    pub mailbox_password: Vec<u8>,
}

/// One credential record.
///
/// Only the public identity and the sealed material are serialised:
/// the working key and the live secret bundle never touch disk, and
/// both are zeroed when the record is dropped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    /// The stable identifier assigned by the upstream provider.
    #[serde(rename = "UserID")]
    pub user_id: String,

    /// The human-visible account name.
    #[serde(rename = "Name")]
    pub name: String,

    /// The account addresses, primary first.
    #[serde(rename = "Emails")]
    pub emails: Vec<String>,

    /// The secret bundle, sealed under the working key.
    #[serde(rename = "SealedSecret", with = "crate::serde::base64_bytes")]
    pub sealed_secret: Vec<u8>,

    /// The working key, sealed under the unlocking key of each slot.
    #[serde(rename = "SealedKeys", with = "crate::serde::base64_map")]
    pub sealed_keys: BTreeMap<String, Vec<u8>>,

    /// The working key. All zeros while the record is locked.
    #[serde(skip)]
    pub(crate) key: [u8; codec::KEY_SIZE],

    /// The live secret bundle. Empty while the record is locked or
    /// logged out.
    #[serde(skip)]
    pub secret: Secret,
}

impl Credentials {
    /// Returns `true` while the working key is not materialised.
    pub fn locked(&self) -> bool {
        self.key.iter().all(|b| *b == 0)
    }

    /// Returns `true` while the record holds a full secret bundle.
    pub fn is_connected(&self) -> bool {
        !self.secret.api_token.is_empty() && !self.secret.mailbox_password.is_empty()
    }

    /// Splits the stored API token into its `(uid, refresh)` pair.
    pub fn split_api_token(&self) -> Result<(&str, &str)> {
        let (uid, refresh) = self
            .secret
            .api_token
            .split_once(':')
            .ok_or(Error::MalformedApiTokenError)?;

        if refresh.contains(':') {
            return Err(Error::MalformedApiTokenError);
        }

        Ok((uid, refresh))
    }

    /// Unlocks the record with the base64-encoded unlocking key of
    /// the given slot.
    ///
    /// Every failure mode (unknown slot, password of the wrong shape,
    /// sealed key failing to authenticate) reports the same
    /// [`Error::UnauthorizedError`]. Unlocking an already-unlocked
    /// record only re-verifies the password.
    pub fn unlock(&mut self, slot: &str, password: &str) -> Result<()> {
        let sealed = self
            .sealed_keys
            .get(slot)
            .ok_or(Error::UnauthorizedError)?;

        let password = BASE64
            .decode(password)
            .map_err(|_| Error::UnauthorizedError)?;
        let password: [u8; codec::KEY_SIZE] = password
            .try_into()
            .map_err(|_| Error::UnauthorizedError)?;

        let key = codec::decrypt(sealed, &password).map_err(|_| Error::UnauthorizedError)?;
        if key.len() != codec::KEY_SIZE {
            return Err(Error::UnauthorizedError);
        }

        if !self.locked() {
            return Ok(());
        }

        self.key.copy_from_slice(&key);
        self.decrypt()
    }

    /// Seals the working key under the given key at the given slot.
    pub fn seal_key(&mut self, slot: impl ToString, key: &[u8; codec::KEY_SIZE]) -> Result<()> {
        if self.locked() {
            return Err(Error::LockedError);
        }

        let sealed = codec::encrypt(&self.key, key)?;
        self.sealed_keys.insert(slot.to_string(), sealed);

        Ok(())
    }

    /// Refreshes the sealed secret from the live bundle.
    pub fn encrypt(&mut self) -> Result<()> {
        if self.locked() {
            return Err(Error::EncryptionFailedError);
        }

        let secret = serde_json::to_vec(&self.secret).map_err(|_| Error::EncryptionFailedError)?;
        self.sealed_secret = codec::encrypt(&secret, &self.key)?;

        Ok(())
    }

    /// Refreshes the live bundle from the sealed secret.
    pub fn decrypt(&mut self) -> Result<()> {
        if self.locked() {
            return Err(Error::DecryptionFailedError);
        }

        let secret = codec::decrypt(&self.sealed_secret, &self.key)?;
        self.secret = serde_json::from_slice(&secret).map_err(|_| Error::DecryptionFailedError)?;

        Ok(())
    }

    /// Zeroes the live secret bundle.
    ///
    /// The sealed copy is left untouched: it is the caller's job to
    /// refresh it beforehand if it should survive.
    pub fn logout(&mut self) -> Result<()> {
        if self.locked() {
            return Err(Error::LockedError);
        }

        self.secret.zeroize();

        Ok(())
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.key.zeroize();
        self.secret.zeroize();
    }
}
