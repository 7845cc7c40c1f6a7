//! # Upstream client
//!
//! Module dedicated to the upstream mail provider seam. The bridge
//! core never talks HTTPS itself: the surrounding application injects
//! implementations of [`Client`] and [`ClientManager`], and the core
//! drives sessions, token rotation and mailbox unlocking through
//! these traits.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

/// The module `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by upstream client implementations.
#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("no connection to the upstream server")]
    NoConnectionError,
    #[error("the application must be upgraded to keep talking to the upstream server")]
    UpgradeApplicationError,
    #[error("upstream authentication failed: {0}")]
    FailedAuthError(String),
    #[error("cannot unlock mailbox keys: {0}")]
    FailedUnlockError(String),
    #[error("upstream API error: {0}")]
    ApiError(String),
}

impl Error {
    /// Returns `true` when the upstream rejected our credentials.
    pub fn is_failed_auth(&self) -> bool {
        matches!(self, Self::FailedAuthError(_) | Self::FailedUnlockError(_))
    }
}

/// The outcome of the first password step of a login.
#[derive(Clone, Debug)]
pub struct Auth {
    /// The session identifier.
    pub uid: String,

    /// The refresh token of the session.
    pub refresh_token: String,

    /// Whether a second factor must be submitted before the session
    /// becomes usable.
    pub two_factor: bool,

    /// Whether the account uses a mailbox passphrase distinct from
    /// the login password.
    pub mailbox_password: bool,
}

impl Auth {
    /// Returns `true` when the account requires a second factor.
    pub fn has_two_factor(&self) -> bool {
        self.two_factor
    }

    /// Returns `true` when the account uses a distinct mailbox
    /// passphrase.
    pub fn has_mailbox_password(&self) -> bool {
        self.mailbox_password
    }
}

/// A rotated refresh token pair, as pushed by the upstream client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthRefresh {
    /// The session identifier.
    pub uid: String,

    /// The new refresh token.
    pub refresh_token: String,
}

/// The upstream view of an account.
#[derive(Clone, Debug, Default)]
pub struct ApiUser {
    /// The stable account identifier.
    pub id: String,

    /// The account name.
    pub name: String,

    /// The bytes used on the server, when reported.
    pub used_space: Option<i64>,

    /// The bytes available on the server, when reported.
    pub max_space: Option<i64>,
}

/// One upstream address.
#[derive(Clone, Debug)]
pub struct ApiAddress {
    /// The upstream address identifier.
    pub id: String,

    /// The address itself.
    pub email: String,
}

impl std::fmt::Debug for dyn Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

/// A live upstream session.
#[async_trait]
pub trait Client: Send + Sync {
    /// Subscribes to refresh-token rotations.
    ///
    /// A `None` payload means the session was revoked upstream and
    /// the user must be logged out.
    fn auth_refresh_events(&self) -> broadcast::Receiver<Option<AuthRefresh>>;

    /// Gets the account behind the session.
    async fn current_user(&self) -> Result<ApiUser>;

    /// Lists the account addresses, primary first.
    async fn addresses(&self) -> Result<Vec<ApiAddress>>;

    /// Returns `true` when the mailbox keys are already unlocked.
    fn is_unlocked(&self) -> bool;

    /// Unlocks the mailbox keys with the given passphrase.
    async fn unlock(&self, mailbox_password: &[u8]) -> Result<()>;

    /// Re-reads the account keys after an address change.
    async fn reload_keys(&self, mailbox_password: &[u8]) -> Result<()>;

    /// Submits the second-factor code of a pending login.
    async fn auth_2fa(&self, code: &str) -> Result<()>;

    /// Deletes the upstream session.
    async fn auth_delete(&self) -> Result<()>;
}

/// The upstream session factory.
#[async_trait]
pub trait ClientManager: Send + Sync {
    /// Builds a client over an existing session without talking to
    /// the server. Empty identifiers yield a blank, offline client.
    fn new_client(&self, uid: &str, refresh: &str) -> Arc<dyn Client>;

    /// Exchanges a refresh token for a live session and a rotated
    /// token pair.
    async fn new_client_with_refresh(
        &self,
        uid: &str,
        refresh: &str,
    ) -> Result<(Arc<dyn Client>, AuthRefresh)>;

    /// Starts a login with the account password.
    async fn new_client_with_login(
        &self,
        username: &str,
        password: &[u8],
    ) -> Result<(Arc<dyn Client>, Auth)>;
}
