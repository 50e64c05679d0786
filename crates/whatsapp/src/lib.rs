//! Business phone messaging platform.
//!
//! Business accounts are discovered from the granular scopes of an authorized
//! token, their phone numbers are indexed as sub-resources, and inbound
//! `messages` changes are routed to the owning account by phone number id.

pub mod discovery;
pub mod plugin;
pub mod types;
pub mod webhook;

pub use plugin::WhatsAppPlugin;
