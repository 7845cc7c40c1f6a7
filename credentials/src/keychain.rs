//! # Legacy keychain
//!
//! Module dedicated to the single-key credential keychain that
//! predates the multi-slot store. Every secret is sealed under one
//! 32-byte process key before touching disk. The key is sourced from
//! the environment by the caller and plumbed through the
//! constructors, so the module holds no global state. The backend is
//! a small injectable capability, allowing an OS-provided keychain to
//! replace the file-backed one.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tokio::{fs, sync::Mutex};
use tracing::debug;

use crate::{codec, Error, Result};

/// The environment variable holding the base64-encoded process key
/// of the legacy keychain file.
pub const CREDENTIALS_KEY_ENV_VAR: &str = "PEROXIDE_CREDENTIALS_KEY";

/// Reads the legacy process key from the environment.
pub fn process_key_from_env() -> Result<[u8; codec::KEY_SIZE]> {
    let key = std::env::var(CREDENTIALS_KEY_ENV_VAR)
        .map_err(|_| Error::GetProcessKeyError(CREDENTIALS_KEY_ENV_VAR.to_owned()))?;

    let key = BASE64.decode(key).map_err(Error::DecodeProcessKeyError)?;

    key.try_into()
        .map_err(|_| Error::InvalidProcessKeySizeError(codec::KEY_SIZE))
}

/// One keychain entry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// The URL scoping the entry to a service.
    pub url: String,

    /// The user identifier the secret belongs to.
    pub user_id: String,

    /// The secret payload.
    pub secret: String,
}

/// The keychain backend capability.
#[async_trait]
pub trait Helper: Send + Sync {
    /// Adds or replaces an entry.
    async fn add(&self, entry: Entry) -> Result<()>;

    /// Gets the user identifier and secret stored at the given URL.
    async fn get(&self, url: &str) -> Result<(String, String)>;

    /// Deletes the entry at the given URL.
    async fn delete(&self, url: &str) -> Result<()>;

    /// Lists stored entries as a URL → user identifier mapping.
    async fn list(&self) -> Result<HashMap<String, String>>;
}

/// The file-backed keychain backend.
pub struct StaticHelper {
    path: PathBuf,
    key: [u8; codec::KEY_SIZE],
    entries: Mutex<HashMap<String, Entry>>,
}

impl StaticHelper {
    /// Loads the keychain file, unsealing every secret with the given
    /// process key. A missing file yields an empty keychain.
    pub async fn new(path: impl Into<PathBuf>, key: [u8; codec::KEY_SIZE]) -> Result<Self> {
        let path = path.into();

        let sealed: HashMap<String, Entry> = match fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|err| Error::ParseCredentialsError(err, path.clone()))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(Error::ReadCredentialsError(err, path)),
        };

        let mut entries = HashMap::with_capacity(sealed.len());
        for (url, mut entry) in sealed {
            let sealed_secret = BASE64
                .decode(&entry.secret)
                .map_err(|_| Error::DecryptionFailedError)?;
            let secret = codec::decrypt(&sealed_secret, &key)?;
            entry.secret =
                String::from_utf8(secret).map_err(|_| Error::DecryptionFailedError)?;
            entries.insert(url, entry);
        }

        Ok(Self {
            path,
            key,
            entries: Mutex::new(entries),
        })
    }

    async fn dump(&self, entries: &HashMap<String, Entry>) -> Result<()> {
        debug!(path = %self.path.display(), "saving keychain");

        let mut sealed = HashMap::with_capacity(entries.len());
        for (url, entry) in entries {
            let sealed_secret = codec::encrypt(entry.secret.as_bytes(), &self.key)?;
            sealed.insert(
                url.clone(),
                Entry {
                    secret: BASE64.encode(sealed_secret),
                    ..entry.clone()
                },
            );
        }

        let json = serde_json::to_vec_pretty(&sealed).map_err(Error::SerializeCredentialsError)?;

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

#[async_trait]
impl Helper for StaticHelper {
    async fn add(&self, entry: Entry) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(entry.url.clone(), entry);
        self.dump(&entries).await
    }

    async fn get(&self, url: &str) -> Result<(String, String)> {
        let entries = self.entries.lock().await;
        let entry = entries
            .get(url)
            .ok_or_else(|| Error::KeychainEntryNotFoundError(url.to_owned()))?;

        Ok((entry.user_id.clone(), entry.secret.clone()))
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(url);
        self.dump(&entries).await
    }

    async fn list(&self) -> Result<HashMap<String, String>> {
        let entries = self.entries.lock().await;

        Ok(entries
            .iter()
            .map(|(url, entry)| (url.clone(), entry.user_id.clone()))
            .collect())
    }
}

/// The keychain, scoping the entries of one service behind an
/// injected backend.
pub struct Keychain {
    helper: Box<dyn Helper>,
    url: String,
}

impl Keychain {
    /// Creates a keychain over the given backend.
    pub fn new(helper: Box<dyn Helper>, service: &str) -> Self {
        Self {
            helper,
            url: format!("peroxide/{service}/users"),
        }
    }

    fn secret_url(&self, user_id: &str) -> String {
        format!("{}/{}", self.url, user_id)
    }

    /// Lists the user identifiers stored for this service, in
    /// ascending order.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut user_ids: Vec<String> = self
            .helper
            .list()
            .await?
            .into_iter()
            .filter(|(url, user_id)| url == &self.secret_url(user_id))
            .map(|(_, user_id)| user_id)
            .collect();

        user_ids.sort();

        Ok(user_ids)
    }

    /// Gets the user identifier and secret of the given user.
    pub async fn get(&self, user_id: &str) -> Result<(String, String)> {
        self.helper.get(&self.secret_url(user_id)).await
    }

    /// Adds or replaces the secret of the given user.
    pub async fn put(&self, user_id: impl ToString, secret: impl ToString) -> Result<()> {
        let user_id = user_id.to_string();

        self.helper
            .add(Entry {
                url: self.secret_url(&user_id),
                user_id,
                secret: secret.to_string(),
            })
            .await
    }

    /// Deletes the secret of the given user, if any.
    pub async fn delete(&self, user_id: &str) -> Result<()> {
        let url = self.secret_url(user_id);

        if !self.helper.list().await?.contains_key(&url) {
            return Ok(());
        }

        self.helper.delete(&url).await
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
