//! # User
//!
//! Module dedicated to one bridge user: the unlock state machine over
//! its credential record, plus the upstream client and the mail store
//! attached to it while online.
//!
//! ```text
//!   LOCKED --unlock(slot, pwd)--> UNLOCKED_DISCONNECTED
//!                                      | bring_online
//!                                      v
//!                                  CONNECTED
//!                                      | logout (sealed secret kept)
//!                                      v
//!                              UNLOCKED_DISCONNECTED
//! ```

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use credentials::{Credentials, Store};
use tokio::{
    sync::{broadcast, RwLock},
    time,
};
use tracing::{debug, info, warn};

use crate::{
    client::{self, AuthRefresh, Client, ClientManager},
    event::{Event, EventBus},
    store::{MailStore, MailStoreBuilder},
};

use super::{Error, Result};

/// One bridge user.
///
/// Every public operation is guarded by a per-user reader/writer
/// lock: `check_credentials`, `bring_online`, `logout` and
/// `update_user` exclude one another.
pub struct User {
    user_id: String,
    creds_store: Arc<Store>,
    manager: Arc<dyn ClientManager>,
    store_builder: Arc<dyn MailStoreBuilder>,
    events: EventBus,
    failed_auth_delay: Duration,
    state: RwLock<State>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

struct State {
    creds: Credentials,
    client: Option<Arc<dyn Client>>,
    mail_store: Option<Arc<dyn MailStore>>,
    used_space: i64,
    total_space: i64,
}

impl User {
    /// Creates a user over its stored credential record.
    ///
    /// The user starts offline and locked; [`User::bring_online`]
    /// attaches the upstream client.
    pub(crate) async fn new(
        user_id: impl ToString,
        creds_store: Arc<Store>,
        manager: Arc<dyn ClientManager>,
        store_builder: Arc<dyn MailStoreBuilder>,
        events: EventBus,
        failed_auth_delay: Duration,
    ) -> Result<Arc<Self>> {
        let user_id = user_id.to_string();

        debug!(user = %user_id, "creating or loading user");

        let creds = creds_store.get(&user_id).await?;

        Ok(Arc::new(Self {
            user_id,
            creds_store,
            manager,
            store_builder,
            events,
            failed_auth_delay,
            state: RwLock::new(State {
                creds,
                client: None,
                mail_store: None,
                used_space: 0,
                total_space: 0,
            }),
        }))
    }

    /// Returns the user identifier.
    pub fn id(&self) -> &str {
        &self.user_id
    }

    /// Returns the account name.
    pub async fn username(&self) -> String {
        self.state.read().await.creds.name.clone()
    }

    /// Returns the address the account was enrolled with.
    pub async fn primary_address(&self) -> Option<String> {
        self.state.read().await.creds.emails.first().cloned()
    }

    /// Returns all the account addresses.
    pub async fn addresses(&self) -> Vec<String> {
        self.state.read().await.creds.emails.clone()
    }

    /// Returns whether the record holds a full secret bundle.
    pub async fn is_connected(&self) -> bool {
        self.state.read().await.creds.is_connected()
    }

    /// Returns the bytes used and available upstream, as last
    /// reported by the space query.
    pub async fn space(&self) -> (i64, i64) {
        let state = self.state.read().await;
        (state.used_space, state.total_space)
    }

    /// Resolves the upstream identifier of the given address,
    /// consulting the mail store first and the live client second.
    pub async fn address_id(&self, email: &str) -> Result<String> {
        let state = self.state.read().await;
        let email = email.to_lowercase();

        if let Some(mail_store) = &state.mail_store {
            if let Some(id) = mail_store.address_id(&email).await {
                return Ok(id);
            }
        }

        let client = state.client.as_ref().ok_or(Error::NotConnectedError)?;

        client
            .addresses()
            .await?
            .into_iter()
            .find(|address| address.email.eq_ignore_ascii_case(&email))
            .map(|address| address.id)
            .ok_or(Error::AddressNotFoundError(email))
    }

    /// Verifies a frontend login against the record.
    ///
    /// A locked record is unlocked first; a valid password over a
    /// logged-out record yields [`Error::LoggedOutUserError`]; an
    /// already-unlocked record still re-verifies the password. Every
    /// failure is reported only after the configured delay, to make
    /// local brute force uneconomical.
    pub async fn check_credentials(&self, slot: &str, password: &str) -> Result<()> {
        let res = self.try_check_credentials(slot, password).await;

        if let Err(err) = &res {
            warn!(user = %self.user_id, error = %err, "frontend credentials check failed");
            time::sleep(self.failed_auth_delay).await;
        }

        res
    }

    async fn try_check_credentials(&self, slot: &str, password: &str) -> Result<()> {
        let mut state = self.state.write().await;

        // Another path (store CLI, revoked session) may have touched
        // the record since it was copied here.
        state.creds = self.creds_store.get(&self.user_id).await?;

        let mut verified = false;
        if state.creds.locked() {
            state.creds = self.creds_store.unlock(&self.user_id, slot, password).await?;
            verified = true;
        }

        if !state.creds.is_connected() {
            return Err(Error::LoggedOutUserError);
        }

        if verified {
            return Ok(());
        }

        state.creds = self.creds_store.unlock(&self.user_id, slot, password).await?;

        Ok(())
    }

    /// Unlocks the record without touching connectivity.
    pub async fn unlock_credentials(&self, slot: &str, password: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.creds = self.creds_store.unlock(&self.user_id, slot, password).await?;

        Ok(())
    }

    /// Brings the user online.
    ///
    /// A locked record is unlocked with the given slot first. A
    /// disconnected record gets a blank offline client; a connected
    /// one exchanges its refresh token for a live session, persists
    /// the rotated pair and attaches the resulting client. An
    /// upstream rejection of the token logs the user out entirely;
    /// a transport failure leaves it untouched.
    pub async fn bring_online(self: &Arc<Self>, slot: &str, password: &str) -> Result<()> {
        let mut state = self.state.write().await;

        if state.client.is_some() {
            return Ok(());
        }

        if state.creds.locked() {
            state.creds = self.creds_store.unlock(&self.user_id, slot, password).await?;
        }

        if !state.creds.is_connected() {
            let client = self.manager.new_client("", "");
            return self.connect(&mut state, client).await;
        }

        let (uid, refresh) = {
            let (uid, refresh) = state.creds.split_api_token()?;
            (uid.to_owned(), refresh.to_owned())
        };

        match self.manager.new_client_with_refresh(&uid, &refresh).await {
            Ok((client, auth)) => {
                state.creds = self
                    .creds_store
                    .update_token(&self.user_id, &auth.uid, &auth.refresh_token)
                    .await?;

                self.connect(&mut state, client).await
            }
            Err(
                err @ (client::Error::NoConnectionError | client::Error::UpgradeApplicationError),
            ) => Err(err.into()),
            Err(err) if err.is_failed_auth() => {
                warn!(user = %self.user_id, "upstream rejected the refresh token, logging out");
                self.logout_with_state(&mut state).await;
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Attaches a live client: registers the auth-refresh forwarder,
    /// unlocks the mailbox keys if needed, initialises the mail store
    /// and kicks the space-usage query.
    async fn connect(self: &Arc<Self>, state: &mut State, client: Arc<dyn Client>) -> Result<()> {
        info!(user = %self.user_id, "connecting user");

        state.client = Some(client.clone());
        self.watch_auth_refresh(&client);

        if state.creds.is_connected() && !client.is_unlocked() {
            if let Err(err) = client.unlock(&state.creds.secret.mailbox_password).await {
                if err.is_failed_auth() {
                    self.logout_with_state(state).await;
                    return Err(err.into());
                }

                // The connection may simply be down; the next access
                // retries the unlock.
                warn!(user = %self.user_id, error = %err, "skipping mailbox unlock");
            }
        }

        let mail_store = self
            .store_builder
            .build(&self.user_id, state.creds.is_connected())
            .await
            .map_err(Error::BuildMailStoreError)?;
        state.mail_store = Some(mail_store);

        self.update_space(state).await;

        Ok(())
    }

    /// Forwards refresh-token rotations from the client to the
    /// credential store. A revoked session triggers a full logout.
    ///
    /// The task holds a weak reference, so it never keeps a deleted
    /// user alive; it exits when the client drops its channel.
    fn watch_auth_refresh(self: &Arc<Self>, client: &Arc<dyn Client>) {
        let mut refreshes = client.auth_refresh_events();
        let user = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                match refreshes.recv().await {
                    Ok(Some(refresh)) => {
                        let Some(user) = Weak::upgrade(&user) else {
                            break;
                        };
                        user.handle_auth_refresh(refresh).await;
                    }
                    Ok(None) => {
                        let Some(user) = Weak::upgrade(&user) else {
                            break;
                        };
                        debug!(user = %user.user_id, "upstream session revoked");
                        if let Err(err) = user.logout().await {
                            warn!(user = %user.user_id, error = %err, "logout failed while watching upstream auths");
                        }
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    async fn handle_auth_refresh(&self, refresh: AuthRefresh) {
        debug!(user = %self.user_id, "received upstream auth refresh");

        match self
            .creds_store
            .update_token(&self.user_id, &refresh.uid, &refresh.refresh_token)
            .await
        {
            Ok(creds) => self.state.write().await.creds = creds,
            Err(err) => {
                warn!(user = %self.user_id, error = %err, "cannot update refresh token in credentials store");
            }
        }
    }

    /// Refreshes the account details from upstream: re-reads the
    /// user, reloads its keys and persists the active address list.
    pub async fn update_user(&self) -> Result<()> {
        let mut state = self.state.write().await;

        let client = state.client.clone().ok_or(Error::NotConnectedError)?;

        let user = client.current_user().await?;

        client
            .reload_keys(&state.creds.secret.mailbox_password)
            .await?;

        let emails = client
            .addresses()
            .await?
            .into_iter()
            .map(|address| address.email)
            .collect();

        state.creds = self.creds_store.update_emails(&self.user_id, emails).await?;

        if let Some(used) = user.used_space {
            state.used_space = used;
        }
        if let Some(max) = user.max_space {
            state.total_space = max;
        }

        Ok(())
    }

    async fn update_space(&self, state: &mut State) {
        let Some(client) = &state.client else {
            return;
        };

        match client.current_user().await {
            Ok(user) => {
                if let Some(used) = user.used_space {
                    state.used_space = used;
                }
                if let Some(max) = user.max_space {
                    state.total_space = max;
                }
            }
            Err(err) => warn!(user = %self.user_id, error = %err, "cannot update user space"),
        }
    }

    /// Logs the user out: deletes the upstream session (best effort),
    /// zeroes the live secret while keeping the sealed copy, closes
    /// the mail-store event loop and asks the frontends to drop every
    /// live connection of the account.
    pub async fn logout(&self) -> Result<()> {
        let mut state = self.state.write().await;
        self.logout_with_state(&mut state).await;

        Ok(())
    }

    async fn logout_with_state(&self, state: &mut State) {
        debug!(user = %self.user_id, "logging out user");

        if !state.creds.is_connected() {
            return;
        }

        match state.client.take() {
            Some(client) => {
                if let Err(err) = client.auth_delete().await {
                    warn!(user = %self.user_id, error = %err, "cannot delete upstream auth");
                }
            }
            None => warn!(user = %self.user_id, "cannot delete upstream auth: no client"),
        }

        match self.creds_store.logout(&self.user_id).await {
            Ok(creds) => state.creds = creds,
            Err(err) => {
                warn!(user = %self.user_id, error = %err, "cannot log user out from credentials store");
                if let Err(err) = self.creds_store.delete(&self.user_id).await {
                    warn!(user = %self.user_id, error = %err, "cannot delete user from credentials store");
                }
            }
        }

        if let Some(mail_store) = &state.mail_store {
            mail_store.close_event_loop().await;
        }

        for address in &state.creds.emails {
            self.events.emit(Event::CloseConnection(address.clone()));
        }

        self.events.emit(Event::Logout(self.user_id.clone()));
    }

    /// Lists the record's key slots, `main` first.
    pub async fn list_key_slots(&self) -> Result<Vec<String>> {
        let _guard = self.state.read().await;

        self.creds_store
            .list_key_slots(&self.user_id)
            .await
            .map_err(Into::into)
    }

    /// Creates a key slot sealed under a fresh key and returns that
    /// key base64-encoded. Only the main key can bootstrap a slot.
    pub async fn add_key_slot(&self, slot: &str, main_key_password: &str) -> Result<String> {
        let mut state = self.state.write().await;

        let slot_key = self
            .creds_store
            .add_key_slot(&self.user_id, slot, main_key_password)
            .await?;

        state.creds = self.creds_store.get(&self.user_id).await?;

        Ok(slot_key)
    }

    /// Removes the given key slot. The `main` slot can never be
    /// removed.
    pub async fn remove_key_slot(&self, slot: &str) -> Result<()> {
        let mut state = self.state.write().await;

        self.creds_store.remove_key_slot(&self.user_id, slot).await?;

        state.creds = self.creds_store.get(&self.user_id).await?;

        Ok(())
    }

    /// Attaches an already-authenticated client, as produced by the
    /// login pipeline.
    pub(crate) async fn attach(self: &Arc<Self>, client: Arc<dyn Client>) -> Result<()> {
        let mut state = self.state.write().await;
        self.connect(&mut state, client).await
    }

    /// Removes the user's mail-store data.
    pub(crate) async fn clear_store(&self) -> Result<()> {
        let state = self.state.read().await;

        match &state.mail_store {
            Some(mail_store) => mail_store
                .remove()
                .await
                .map_err(Error::RemoveMailStoreError),
            None => {
                warn!(user = %self.user_id, "mail store not initialized, removing its files directly");
                self.store_builder
                    .remove(&self.user_id)
                    .await
                    .map_err(Error::RemoveMailStoreError)
            }
        }
    }
}
