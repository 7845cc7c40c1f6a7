#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![doc = include_str!("../README.md")]

pub mod account;
pub mod client;
pub mod config;
pub mod event;
pub mod store;
pub mod tls;

#[doc(inline)]
pub use crate::{
    account::{decode_login, NewLogin, User, Users},
    client::{ApiAddress, ApiUser, Auth, AuthRefresh, Client, ClientManager},
    config::Config,
    event::{Event, EventBus},
    store::{MailStore, MailStoreBuilder},
    tls::{Template, Tls},
};
