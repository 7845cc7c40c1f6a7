//! # Error
//!
//! Module dedicated to account errors.

use thiserror::Error;

use crate::{client, store::StoreError};

/// The module `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors related to account management.
#[derive(Debug, Error)]
pub enum Error {
    #[error("account is logged out, use the app to login again")]
    LoggedOutUserError,
    #[error("cannot find user matching `{0}`")]
    UserNotFoundError(String),
    #[error("cannot find address `{0}`")]
    AddressNotFoundError(String),
    #[error("user has no upstream client attached")]
    NotConnectedError,
    #[error("cannot build mail store")]
    BuildMailStoreError(#[source] StoreError),
    #[error("cannot remove mail store")]
    RemoveMailStoreError(#[source] StoreError),

    #[error(transparent)]
    CredentialsError(#[from] credentials::Error),
    #[error(transparent)]
    ClientError(#[from] client::Error),
}
