#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![doc = include_str!("../README.md")]

pub mod codec;
mod error;
pub mod keychain;
mod record;
pub(crate) mod serde;
mod store;

#[doc(inline)]
pub use crate::{
    error::{Error, Result},
    record::{Credentials, Secret, MAIN_KEY_SLOT},
    store::Store,
};
