//! # Credential store
//!
//! Module dedicated to the persistent credential collection. The
//! store maps user identifiers to [`Credentials`] records behind a
//! single reader/writer lock and mirrors every mutation to one JSON
//! file, written atomically with owner-only permissions.

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio::{fs, sync::RwLock};
use tracing::{debug, info};

use crate::{codec, record::MAIN_KEY_SLOT, Credentials, Error, Result, Secret};

/// The encrypted credential store.
pub struct Store {
    path: PathBuf,
    creds: RwLock<BTreeMap<String, Credentials>>,
}

impl Store {
    /// Opens the store backed by the given file.
    ///
    /// A missing file yields an empty store. Records are loaded
    /// locked: neither working keys nor secrets are materialised.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let creds = match fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|err| Error::ParseCredentialsError(err, path.clone()))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "credentials file not found, starting empty");
                BTreeMap::new()
            }
            Err(err) => return Err(Error::ReadCredentialsError(err, path)),
        };

        Ok(Self {
            path,
            creds: RwLock::new(creds),
        })
    }

    /// Lists the stored user identifiers, in ascending order.
    pub async fn list(&self) -> Vec<String> {
        self.creds.read().await.keys().cloned().collect()
    }

    /// Gets a copy of the record of the given user.
    pub async fn get(&self, user_id: &str) -> Result<Credentials> {
        self.creds
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| Error::NotFoundError(user_id.to_owned()))
    }

    /// Adds credentials for a new user.
    ///
    /// A fresh working key seals the secret bundle and is itself
    /// sealed under a fresh main key in the `main` slot. The main key
    /// is returned raw exactly once: it is never stored, and losing
    /// it together with every other slot key renders the record
    /// unrecoverable.
    pub async fn add(
        &self,
        user_id: impl ToString,
        name: impl ToString,
        uid: &str,
        refresh: &str,
        mailbox_password: impl Into<Vec<u8>>,
        emails: Vec<String>,
    ) -> Result<(Credentials, [u8; codec::KEY_SIZE])> {
        let user_id = user_id.to_string();

        let mut creds = self.creds.write().await;

        if creds.contains_key(&user_id) {
            return Err(Error::AlreadyExistsError(user_id));
        }

        info!(user = %user_id, "generating credentials for new user");

        let main_key = codec::generate_key();

        let mut record = Credentials {
            user_id: user_id.clone(),
            name: name.to_string(),
            emails,
            sealed_secret: Vec::new(),
            sealed_keys: BTreeMap::new(),
            key: codec::generate_key(),
            secret: Secret {
                api_token: format!("{uid}:{refresh}"),
                mailbox_password: mailbox_password.into(),
            },
        };

        record.seal_key(MAIN_KEY_SLOT, &main_key)?;
        record.encrypt()?;

        creds.insert(user_id, record.clone());
        self.save(&creds).await?;

        Ok((record, main_key))
    }

    /// Unlocks the record of the given user in place and returns a
    /// copy of it.
    ///
    /// Unlocking an already-unlocked record only re-verifies the
    /// password.
    pub async fn unlock(&self, user_id: &str, slot: &str, password: &str) -> Result<Credentials> {
        let mut creds = self.creds.write().await;
        let record = creds
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFoundError(user_id.to_owned()))?;

        record.unlock(slot, password)?;

        Ok(record.clone())
    }

    /// Replaces the address list of the given user.
    pub async fn update_emails(&self, user_id: &str, emails: Vec<String>) -> Result<Credentials> {
        let mut creds = self.creds.write().await;
        let record = creds
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFoundError(user_id.to_owned()))?;

        record.emails = emails;
        let record = record.clone();

        self.save(&creds).await?;

        Ok(record)
    }

    /// Replaces the mailbox passphrase of the given user.
    ///
    /// The record must be unlocked: the sealed secret is refreshed
    /// under the working key before persisting.
    pub async fn update_password(
        &self,
        user_id: &str,
        password: impl Into<Vec<u8>>,
    ) -> Result<Credentials> {
        let mut creds = self.creds.write().await;
        let record = creds
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFoundError(user_id.to_owned()))?;

        if record.locked() {
            return Err(Error::LockedError);
        }

        record.secret.mailbox_password = password.into();
        record.encrypt()?;
        let record = record.clone();

        self.save(&creds).await?;

        Ok(record)
    }

    /// Replaces the API token pair of the given user.
    ///
    /// The record must be unlocked: the sealed secret is refreshed
    /// under the working key before persisting.
    pub async fn update_token(&self, user_id: &str, uid: &str, refresh: &str) -> Result<Credentials> {
        let mut creds = self.creds.write().await;
        let record = creds
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFoundError(user_id.to_owned()))?;

        if record.locked() {
            return Err(Error::LockedError);
        }

        record.secret.api_token = format!("{uid}:{refresh}");
        record.encrypt()?;
        let record = record.clone();

        self.save(&creds).await?;

        Ok(record)
    }

    /// Lists the key slot names of the given user, `main` first and
    /// the rest in ascending order.
    pub async fn list_key_slots(&self, user_id: &str) -> Result<Vec<String>> {
        let creds = self.creds.read().await;
        let record = creds
            .get(user_id)
            .ok_or_else(|| Error::NotFoundError(user_id.to_owned()))?;

        let mut slots = vec![MAIN_KEY_SLOT.to_owned()];
        slots.extend(
            record
                .sealed_keys
                .keys()
                .filter(|slot| slot.as_str() != MAIN_KEY_SLOT)
                .cloned(),
        );

        Ok(slots)
    }

    /// Seals the working key of the given user under a fresh key at
    /// the given slot, and returns that key base64-encoded.
    ///
    /// Only the main key can bootstrap a new slot. The in-memory slot
    /// is rolled back if persisting fails.
    pub async fn add_key_slot(
        &self,
        user_id: &str,
        slot: &str,
        main_key_password: &str,
    ) -> Result<String> {
        let mut creds = self.creds.write().await;
        let record = creds
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFoundError(user_id.to_owned()))?;

        if record.sealed_keys.contains_key(slot) {
            return Err(Error::SlotAlreadyExistsError(slot.to_owned()));
        }

        record.unlock(MAIN_KEY_SLOT, main_key_password)?;

        let slot_key = codec::generate_key();
        record.seal_key(slot, &slot_key)?;

        debug!(user = user_id, slot, "added key slot");

        if let Err(err) = self.save(&creds).await {
            if let Some(record) = creds.get_mut(user_id) {
                record.sealed_keys.remove(slot);
            }
            return Err(err);
        }

        Ok(BASE64.encode(slot_key))
    }

    /// Removes the given key slot.
    ///
    /// The `main` slot can never be removed. The slot is restored in
    /// memory if persisting fails.
    pub async fn remove_key_slot(&self, user_id: &str, slot: &str) -> Result<()> {
        if slot == MAIN_KEY_SLOT {
            return Err(Error::CantRemoveMainSlotError);
        }

        let mut creds = self.creds.write().await;
        let record = creds
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFoundError(user_id.to_owned()))?;

        let sealed = record
            .sealed_keys
            .remove(slot)
            .ok_or_else(|| Error::SlotNotFoundError(slot.to_owned()))?;

        debug!(user = user_id, slot, "removed key slot");

        if let Err(err) = self.save(&creds).await {
            if let Some(record) = creds.get_mut(user_id) {
                record.sealed_keys.insert(slot.to_owned(), sealed);
            }
            return Err(err);
        }

        Ok(())
    }

    /// Logs the given user out.
    ///
    /// The sealed secret is refreshed from the still-populated bundle
    /// first, so it survives on disk; only the live copy is zeroed.
    pub async fn logout(&self, user_id: &str) -> Result<Credentials> {
        let mut creds = self.creds.write().await;
        let record = creds
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFoundError(user_id.to_owned()))?;

        record.encrypt()?;
        record.logout()?;
        let record = record.clone();

        self.save(&creds).await?;

        Ok(record)
    }

    /// Removes the record of the given user.
    pub async fn delete(&self, user_id: &str) -> Result<()> {
        let mut creds = self.creds.write().await;

        if creds.remove(user_id).is_none() {
            return Err(Error::NotFoundError(user_id.to_owned()));
        }

        self.save(&creds).await
    }

    /// Serialises the live mapping to the backing file.
    ///
    /// The document is written to a sibling temporary file, given
    /// owner-only permissions, then renamed over the target so a
    /// crash mid-write cannot corrupt the store.
    async fn save(&self, creds: &BTreeMap<String, Credentials>) -> Result<()> {
        debug!(path = %self.path.display(), "saving credentials");

        let json = serde_json::to_vec_pretty(creds).map_err(Error::SerializeCredentialsError)?;

        let tmp = self.path.with_extension("tmp");

        fs::write(&tmp, &json)
            .await
            .map_err(|err| Error::WriteCredentialsError(err, tmp.clone()))?;

        set_owner_only(&tmp).await?;

        fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| Error::WriteCredentialsError(err, self.path.clone()))
    }
}

#[cfg(unix)]
async fn set_owner_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|err| Error::WriteCredentialsError(err, path.to_owned()))
}

#[cfg(not(unix))]
async fn set_owner_only(_path: &Path) -> Result<()> {
    Ok(())
}
