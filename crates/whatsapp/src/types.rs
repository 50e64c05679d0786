//! Graph nodes and webhook payloads.

use {
    serde::Deserialize,
    switchboard_channels::{MessageContent, NormalizedMessage},
};

// ── Graph nodes ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Edge<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusinessAccountNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone_numbers: Option<Edge<PhoneNumberNode>>,
    #[serde(default)]
    pub subscribed_apps: Option<Edge<SubscribedApp>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhoneNumberNode {
    pub id: String,
    #[serde(default)]
    pub display_phone_number: String,
    #[serde(default)]
    pub verified_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribedApp {
    pub whatsapp_business_api_data: ApiData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiData {
    pub id: String,
}

impl BusinessAccountNode {
    /// Whether app `app_id` receives this account's webhooks.
    pub fn is_subscribed(&self, app_id: &str) -> bool {
        self.subscribed_apps
            .as_ref()
            .is_some_and(|apps| apps.data.iter().any(|a| a.whatsapp_business_api_data.id == app_id))
    }
}

// ── Webhook payloads ────────────────────────────────────────────────────────

/// Value of a `messages` change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesValue {
    #[serde(default)]
    pub messaging_product: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub statuses: Vec<Status>,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

impl MessagesValue {
    /// Profile name of the customer `wa_id`.
    pub fn contact_name(&self, wa_id: &str) -> Option<String> {
        self.contacts
            .iter()
            .find(|c| c.wa_id == wa_id)
            .and_then(|c| c.profile.as_ref())
            .map(|p| p.name.clone())
            .filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub display_phone_number: String,
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
}

/// Delivery receipt for an outbound message.
#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub id: String,
    #[serde(default)]
    pub recipient_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub from: String,
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "type", default)]
    pub message_type: String,
    #[serde(default)]
    pub context: Option<MessageContext>,
    #[serde(default)]
    pub text: Option<Text>,
    #[serde(default)]
    pub image: Option<Media>,
    #[serde(default)]
    pub audio: Option<Media>,
    #[serde(default)]
    pub video: Option<Media>,
    #[serde(default)]
    pub document: Option<Media>,
    #[serde(default)]
    pub sticker: Option<Media>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub button: Option<Button>,
    #[serde(default)]
    pub interactive: Option<Interactive>,
    #[serde(default)]
    pub reaction: Option<Reaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageContext {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Text {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Media {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: Option<String>,
}

/// Quick-reply button of a template message.
#[derive(Debug, Clone, Deserialize)]
pub struct Button {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interactive {
    #[serde(default)]
    pub button_reply: Option<Reply>,
    #[serde(default)]
    pub list_reply: Option<Reply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reaction {
    pub message_id: String,
    #[serde(default)]
    pub emoji: String,
}

impl Message {
    fn media(&self) -> Option<(&'static str, &Media)> {
        [
            ("image", &self.image),
            ("audio", &self.audio),
            ("video", &self.video),
            ("file", &self.document),
            ("sticker", &self.sticker),
        ]
        .into_iter()
        .find_map(|(kind, media)| media.as_ref().map(|m| (kind, m)))
    }

    pub fn content(&self) -> MessageContent {
        if let Some(text) = &self.text {
            return MessageContent::Text {
                text: text.body.clone(),
            };
        }
        if let Some((kind, media)) = self.media() {
            return MessageContent::Media {
                kind: kind.to_string(),
                media_id: media.id.clone(),
                url: None,
                mime_type: media.mime_type.clone(),
                caption: media.caption.clone(),
            };
        }
        if let Some(location) = &self.location {
            return MessageContent::Location {
                latitude: location.latitude,
                longitude: location.longitude,
                name: location.name.clone(),
            };
        }
        if let Some(button) = &self.button {
            return MessageContent::Postback {
                title: button.text.clone(),
                payload: button.payload.clone(),
            };
        }
        if let Some(reply) = self
            .interactive
            .as_ref()
            .and_then(|i| i.button_reply.as_ref().or(i.list_reply.as_ref()))
        {
            return MessageContent::Postback {
                title: reply.title.clone(),
                payload: reply.id.clone(),
            };
        }
        if let Some(reaction) = &self.reaction {
            return MessageContent::Reaction {
                emoji: reaction.emoji.clone(),
                message_id: reaction.message_id.clone(),
            };
        }
        MessageContent::Unsupported {
            kind: self.message_type.clone(),
        }
    }

    /// Platform-neutral form of this message, addressed to `phone_number_id`.
    pub fn normalize(&self, phone_number_id: &str, sender_name: Option<String>) -> NormalizedMessage {
        NormalizedMessage {
            id: self.id.clone(),
            recipient_id: phone_number_id.to_string(),
            sender_name,
            timestamp: self.timestamp.parse().unwrap_or_default(),
            content: self.content(),
            reply_to: self.context.as_ref().and_then(|c| c.id.clone()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn message(json: serde_json::Value) -> Message {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn text_message() {
        let msg = message(serde_json::json!({
            "from": "16315551234",
            "id": "wamid.1",
            "timestamp": "1700000000",
            "type": "text",
            "text": {"body": "hello"},
            "context": {"from": "15550100", "id": "wamid.0"}
        }));
        let normalized = msg.normalize("106540352242922", Some("Kim".into()));
        assert_eq!(normalized.timestamp, 1_700_000_000);
        assert_eq!(normalized.reply_to.as_deref(), Some("wamid.0"));
        assert_eq!(normalized.content, MessageContent::Text {
            text: "hello".into()
        });
    }

    #[test]
    fn document_is_file_media() {
        let msg = message(serde_json::json!({
            "from": "1", "id": "wamid.2", "timestamp": "1", "type": "document",
            "document": {"id": "media-9", "mime_type": "application/pdf", "caption": "invoice"}
        }));
        match msg.content() {
            MessageContent::Media {
                kind,
                media_id,
                caption,
                ..
            } => {
                assert_eq!(kind, "file");
                assert_eq!(media_id.as_deref(), Some("media-9"));
                assert_eq!(caption.as_deref(), Some("invoice"));
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn interactive_reply_is_postback() {
        let msg = message(serde_json::json!({
            "from": "1", "id": "wamid.3", "timestamp": "1", "type": "interactive",
            "interactive": {"type": "button_reply", "button_reply": {"id": "YES", "title": "Yes"}}
        }));
        assert_eq!(msg.content(), MessageContent::Postback {
            title: "Yes".into(),
            payload: "YES".into()
        });
    }

    #[test]
    fn unknown_type_is_unsupported() {
        let msg = message(serde_json::json!({
            "from": "1", "id": "wamid.4", "timestamp": "bogus", "type": "order"
        }));
        assert_eq!(msg.content(), MessageContent::Unsupported {
            kind: "order".into()
        });
        assert_eq!(msg.normalize("p", None).timestamp, 0);
    }

    #[test]
    fn subscription_state_matches_app() {
        let node: BusinessAccountNode = serde_json::from_value(serde_json::json!({
            "id": "1",
            "name": "Acme",
            "subscribed_apps": {"data": [{"whatsapp_business_api_data": {"id": "42", "name": "bridge"}}]}
        }))
        .unwrap();
        assert!(node.is_subscribed("42"));
        assert!(!node.is_subscribed("43"));
    }
}
