//! Page-based messenger platform, including Instagram profiles linked to
//! pages.

pub mod discovery;
pub mod plugin;
pub mod types;
pub mod webhook;

pub use plugin::MessengerPlugin;
