//! # Accounts
//!
//! Module dedicated to account management: the [`User`] lifecycle,
//! the [`Users`] registry the frontends authenticate against, and the
//! login-string grammar carrying a key-slot selector through a single
//! username field.

mod error;
mod login;
mod user;

use std::{sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use credentials::{codec, Store, MAIN_KEY_SLOT};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    client::{Auth, Client, ClientManager},
    event::EventBus,
    store::MailStoreBuilder,
};

#[doc(inline)]
pub use self::{
    error::{Error, Result},
    login::decode_login,
    user::User,
};

/// The outcome of a finished login.
#[derive(Debug)]
pub struct NewLogin {
    /// The freshly attached user.
    pub user: Arc<User>,

    /// The raw main key. It is never stored: surface it to the human
    /// exactly once.
    pub main_key: [u8; codec::KEY_SIZE],

    /// The base64 key of the extra slot requested at login time, if
    /// any.
    pub slot_key: Option<String>,
}

/// The user registry.
///
/// It owns the credential store and one [`User`] per stored record,
/// and runs the login pipeline: password step, optional second
/// factor (performed by the caller directly on the client), optional
/// mailbox passphrase, then [`Users::finish_login`].
pub struct Users {
    creds_store: Arc<Store>,
    manager: Arc<dyn ClientManager>,
    store_builder: Arc<dyn MailStoreBuilder>,
    events: EventBus,
    failed_auth_delay: Duration,
    users: RwLock<Vec<Arc<User>>>,
}

impl Users {
    /// Creates the registry and loads one locked, offline user per
    /// stored credential record.
    pub async fn new(
        creds_store: Arc<Store>,
        manager: Arc<dyn ClientManager>,
        store_builder: Arc<dyn MailStoreBuilder>,
        events: EventBus,
        failed_auth_delay: Duration,
    ) -> Result<Self> {
        let users = Self {
            creds_store,
            manager,
            store_builder,
            events,
            failed_auth_delay,
            users: RwLock::new(Vec::new()),
        };

        for user_id in users.creds_store.list().await {
            let user = users.new_user(&user_id).await?;
            users.users.write().await.push(user);
        }

        Ok(users)
    }

    async fn new_user(&self, user_id: &str) -> Result<Arc<User>> {
        User::new(
            user_id,
            self.creds_store.clone(),
            self.manager.clone(),
            self.store_builder.clone(),
            self.events.clone(),
            self.failed_auth_delay,
        )
        .await
    }

    /// Returns the attached users.
    pub async fn get_users(&self) -> Vec<Arc<User>> {
        self.users.read().await.clone()
    }

    /// Resolves a frontend login string to a user.
    ///
    /// The string may carry a key slot (see [`decode_login`]); the
    /// remaining login matches the user identifier, the account name
    /// or any address, tolerating case.
    pub async fn get_user(&self, login: &str) -> Result<Arc<User>> {
        let (login, _slot) = decode_login(login);

        for user in self.users.read().await.iter() {
            if user.id().eq_ignore_ascii_case(&login)
                || user.username().await.eq_ignore_ascii_case(&login)
                || user
                    .addresses()
                    .await
                    .iter()
                    .any(|address| address.eq_ignore_ascii_case(&login))
            {
                return Ok(user.clone());
            }
        }

        Err(Error::UserNotFoundError(login))
    }

    /// Starts a login against the upstream provider.
    ///
    /// The returned [`Auth`] reports whether a second factor and a
    /// distinct mailbox passphrase are required; the caller submits
    /// the 2FA code directly on the client, then calls
    /// [`Users::finish_login`].
    pub async fn login(&self, username: &str, password: &[u8]) -> Result<(Arc<dyn Client>, Auth)> {
        info!(user = username, "logging in to the upstream provider");

        self.manager
            .new_client_with_login(username, password)
            .await
            .map_err(Into::into)
    }

    /// Finishes a login: stores the credentials, attaches a new user
    /// and returns it together with its main key.
    ///
    /// When `slot_name` names a slot other than `main`, that slot is
    /// created right away and its base64 key returned alongside, so a
    /// device name given at first login yields a per-device password
    /// without a second round-trip.
    pub async fn finish_login(
        &self,
        client: Arc<dyn Client>,
        auth: &Auth,
        mailbox_password: impl Into<Vec<u8>>,
        slot_name: Option<&str>,
    ) -> Result<NewLogin> {
        let api_user = client.current_user().await?;
        let emails: Vec<String> = client
            .addresses()
            .await?
            .into_iter()
            .map(|address| address.email)
            .collect();

        let (_, main_key) = self
            .creds_store
            .add(
                &api_user.id,
                &api_user.name,
                &auth.uid,
                &auth.refresh_token,
                mailbox_password,
                emails,
            )
            .await?;

        let slot_key = match slot_name {
            Some(slot) if slot != MAIN_KEY_SLOT => Some(
                self.creds_store
                    .add_key_slot(&api_user.id, slot, &BASE64.encode(main_key))
                    .await?,
            ),
            _ => None,
        };

        let user = self.new_user(&api_user.id).await?;
        user.attach(client).await?;

        self.users.write().await.push(user.clone());

        info!(user = %api_user.id, "user logged in and attached");

        Ok(NewLogin {
            user,
            main_key,
            slot_key,
        })
    }

    /// Deletes a user: removes it from the registry, optionally logs
    /// it out upstream first, clears its mail store and deletes its
    /// credentials.
    pub async fn delete_user(&self, user_id: &str, logout_first: bool) -> Result<()> {
        let mut users = self.users.write().await;

        let Some(pos) = users.iter().position(|user| user.id() == user_id) else {
            return Err(Error::UserNotFoundError(user_id.to_owned()));
        };

        let user = users.remove(pos);
        drop(users);

        if logout_first {
            if let Err(err) = user.logout().await {
                warn!(user = user_id, error = %err, "cannot log user out before deletion");
            }
        }

        if let Err(err) = user.clear_store().await {
            warn!(user = user_id, error = %err, "cannot clear user mail store");
        }

        self.creds_store.delete(user_id).await.map_err(Into::into)
    }
}
