//! Hand-off of inbound messages to the conversation engine.

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    switchboard_common::Network,
};

/// Platform-neutral inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// Platform message id (`mid` / `wamid`).
    pub id: String,
    /// Resource the message was addressed to: page, Instagram profile or
    /// phone number id.
    pub recipient_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Unix seconds.
    pub timestamp: i64,
    pub content: MessageContent,
    /// Id of the message this one replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Media {
        /// `image`, `audio`, `video`, `file`, `sticker`, ...
        kind: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Postback {
        title: String,
        payload: String,
    },
    Reaction {
        emoji: String,
        message_id: String,
    },
    Unsupported {
        kind: String,
    },
}

/// Conversation a delivered message was attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHandle {
    pub id: String,
}

/// Receives every inbound message once its account has been resolved.
#[async_trait]
pub trait ConversationEngine: Send + Sync {
    async fn deliver(
        &self,
        network: Network,
        account_id: &str,
        sender_id: &str,
        message: NormalizedMessage,
    ) -> Result<ConversationHandle>;
}
