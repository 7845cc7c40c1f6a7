//! # Configuration
//!
//! Module dedicated to the bridge configuration blob: filesystem
//! paths, listener ports and worker counts, stored as a single JSON
//! document. A missing file yields the defaults, resolved under the
//! user configuration directory.

use std::{
    io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// The module `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors related to configuration management.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read config file at {1}")]
    ReadConfigError(#[source] io::Error, PathBuf),
    #[error("cannot parse config file at {1}")]
    ParseConfigError(#[source] serde_json::Error, PathBuf),
    #[error("cannot write config file at {1}")]
    WriteConfigError(#[source] io::Error, PathBuf),
    #[error("cannot serialize config")]
    SerializeConfigError(#[source] serde_json::Error),
}

/// The bridge configuration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct Config {
    /// The address the IMAP and SMTP listeners bind to.
    pub server_address: String,

    /// The IMAP listener port.
    pub imap_port: u16,

    /// The SMTP listener port.
    pub smtp_port: u16,

    /// The path of the X.509 certificate presented by the listeners.
    pub x509_cert: PathBuf,

    /// The path of the matching RSA private key.
    pub x509_key: PathBuf,

    /// The path of the multi-slot credentials file.
    pub credentials_file: PathBuf,

    /// The path of the persistent cookie jar.
    pub cookie_jar: PathBuf,

    /// The directory holding the on-disk message cache.
    pub cache_dir: PathBuf,

    /// The number of parallel IMAP workers.
    pub imap_workers: usize,

    /// The number of parallel message fetchers.
    pub fetch_workers: usize,

    /// The number of parallel attachment fetchers.
    pub attachment_workers: usize,

    /// The delay applied after a failed frontend login, in seconds.
    pub failed_auth_delay: u64,
}

impl Config {
    /// Loads the configuration from the given path.
    ///
    /// A missing file yields the defaults; an unknown key is an
    /// error, so typos do not silently fall back to defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read(path).await {
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|err| Error::ParseConfigError(err, path.to_owned())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(err) => Err(Error::ReadConfigError(err, path.to_owned())),
        }
    }

    /// Writes the configuration to the given path.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let json = serde_json::to_vec_pretty(self).map_err(Error::SerializeConfigError)?;

        fs::write(path, json)
            .await
            .map_err(|err| Error::WriteConfigError(err, path.to_owned()))
    }
}

impl Default for Config {
    fn default() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("peroxide");

        Self {
            server_address: String::from("127.0.0.1"),
            imap_port: 1143,
            smtp_port: 1025,
            x509_cert: dir.join("cert.pem"),
            x509_key: dir.join("key.pem"),
            credentials_file: dir.join("credentials.json"),
            cookie_jar: dir.join("cookies.json"),
            cache_dir: dir.join("cache"),
            imap_workers: 16,
            fetch_workers: 16,
            attachment_workers: 16,
            failed_auth_delay: 10,
        }
    }
}
