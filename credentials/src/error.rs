//! # Error
//!
//! Module dedicated to credential errors. It contains an [`Error`]
//! enum based on [`thiserror::Error`] and a type alias [`Result`].

use std::{io, path::PathBuf};

use thiserror::Error;

/// The global `Result` alias of the library.
pub type Result<T> = std::result::Result<T, Error>;

/// The global `Error` enum of the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot find credentials matching `{0}`")]
    NotFoundError(String),
    #[error("credentials matching `{0}` already exist")]
    AlreadyExistsError(String),
    #[error("cannot find key slot `{0}`")]
    SlotNotFoundError(String),
    #[error("key slot `{0}` already exists")]
    SlotAlreadyExistsError(String),
    #[error("cannot use locked credentials")]
    LockedError,
    #[error("cannot unlock credentials")]
    UnauthorizedError,
    #[error("cannot encrypt credentials secret")]
    EncryptionFailedError,
    #[error("cannot decrypt credentials secret")]
    DecryptionFailedError,
    #[error("cannot remove the main key slot")]
    CantRemoveMainSlotError,
    #[error("malformed API token")]
    MalformedApiTokenError,

    #[error("cannot read credentials file at {1}")]
    ReadCredentialsError(#[source] io::Error, PathBuf),
    #[error("cannot write credentials file at {1}")]
    WriteCredentialsError(#[source] io::Error, PathBuf),
    #[error("cannot parse credentials file at {1}")]
    ParseCredentialsError(#[source] serde_json::Error, PathBuf),
    #[error("cannot serialize credentials")]
    SerializeCredentialsError(#[source] serde_json::Error),

    #[error("cannot read the process credentials key from `{0}`")]
    GetProcessKeyError(String),
    #[error("cannot decode the process credentials key")]
    DecodeProcessKeyError(#[source] base64::DecodeError),
    #[error("the process credentials key is not {0} bytes long")]
    InvalidProcessKeySizeError(usize),
    #[error("cannot find keychain entry matching `{0}`")]
    KeychainEntryNotFoundError(String),
}
