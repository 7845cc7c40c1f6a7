//! # Mail store
//!
//! Module dedicated to the message-store seam. The real store (the
//! on-disk cache, its event loop, synchronisation) lives outside this
//! crate: the core only needs the handful of operations below to
//! resolve addresses and to tear things down on logout or deletion.

use std::sync::Arc;

use async_trait::async_trait;

/// The error type collaborating stores report.
pub type StoreError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The module `Result` alias.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A handle over one user's message store.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Resolves the upstream identifier of the given address, when
    /// the store knows it (possibly offline).
    async fn address_id(&self, email: &str) -> Option<String>;

    /// Stops the store's event loop, keeping offline data readable.
    async fn close_event_loop(&self);

    /// Closes the store entirely.
    async fn close(&self) -> Result<()>;

    /// Removes the store's on-disk data.
    async fn remove(&self) -> Result<()>;
}

/// The factory building per-user message stores.
#[async_trait]
pub trait MailStoreBuilder: Send + Sync {
    /// Builds the store of the given user.
    async fn build(&self, user_id: &str, connected: bool) -> Result<Arc<dyn MailStore>>;

    /// Removes the on-disk data of the given user without building
    /// its store first.
    async fn remove(&self, user_id: &str) -> Result<()>;
}
