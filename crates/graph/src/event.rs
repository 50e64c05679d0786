//! Webhook delivery envelope.
//!
//! ```json
//! {"object": "whatsapp_business_account",
//!  "entry": [{"id": "...", "time": 1700000000,
//!             "changes": [{"field": "messages", "value": {...}}]}]}
//! ```
//!
//! Field values and messaging events stay as raw JSON here; each platform
//! decodes the parts it understands.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub const OBJECT_PAGE: &str = "page";
pub const OBJECT_INSTAGRAM: &str = "instagram";
pub const OBJECT_WHATSAPP: &str = "whatsapp_business_account";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entry {
    /// Id of the object the entry is about (page, business account, ...).
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub changes: Vec<Change>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
    /// Messenger-style events delivered outside of `changes`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messaging: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub field: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Change {
    /// Decode the field value into a platform-specific type.
    pub fn value_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.value)
    }
}
