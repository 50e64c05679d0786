//! External channel accounts.
//!
//! Each platform family (page messengers, business phone messaging) keeps its
//! accounts in an [`AccountRegistry`] and implements [`PlatformPlugin`] for
//! discovery, webhook subscription and inbound dispatch. The gateway only
//! talks to these traits.

pub mod account;
pub mod engine;
pub mod error;
pub mod platform;
pub mod registry;
pub mod snapshot;
pub mod store;
pub mod subscription;

pub use {
    account::{
        Account, AccountKind, AccountSummary, BusinessPayload, InstagramLink, PagePayload,
        PhoneNumber,
    },
    engine::{ConversationEngine, ConversationHandle, MessageContent, NormalizedMessage},
    error::{Error, FailedAccount, Result},
    platform::{PlatformPlugin, PlatformSet},
    registry::AccountRegistry,
    store::{MemoryMetadataStore, MetadataStore, backup_key},
    subscription::{Direction, SubscriptionReport},
};
