use {
    serde::Deserialize,
    switchboard_channels::{MessageContent, NormalizedMessage},
};

#[derive(Debug, Clone, Deserialize)]
pub struct Edge<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// A page as returned by `me/accounts` or a node read.
#[derive(Debug, Clone, Deserialize)]
pub struct PageNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Page token; only present when the caller manages the page.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub instagram_business_account: Option<InstagramNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstagramNode {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Element of `{page}/subscribed_apps`; only our own app is listed.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribedApp {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub subscribed_fields: Vec<String>,
}

// ── Messaging events ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Party {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagingEvent {
    pub sender: Party,
    pub recipient: Party,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub message: Option<MessageNode>,
    #[serde(default)]
    pub postback: Option<Postback>,
    #[serde(default)]
    pub reaction: Option<ReactionNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageNode {
    pub mid: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub is_echo: bool,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub quick_reply: Option<QuickReply>,
    #[serde(default)]
    pub reply_to: Option<ReplyTo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub payload: Option<AttachmentPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentPayload {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub long: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuickReply {
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyTo {
    #[serde(default)]
    pub mid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postback {
    #[serde(default)]
    pub mid: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReactionNode {
    pub mid: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub emoji: Option<String>,
}

impl MessagingEvent {
    /// Messages our own pages sent, echoed back to us.
    pub fn is_echo(&self) -> bool {
        self.message.as_ref().is_some_and(|m| m.is_echo)
    }

    /// Platform-neutral form of the event, or `None` for events that carry
    /// no message (deliveries, reads, unreacts, ...).
    pub fn normalize(&self) -> Option<NormalizedMessage> {
        let (id, content, reply_to) = if let Some(message) = &self.message {
            (
                message.mid.clone(),
                message_content(message),
                message.reply_to.as_ref().and_then(|r| r.mid.clone()),
            )
        } else if let Some(postback) = &self.postback {
            (
                postback
                    .mid
                    .clone()
                    .unwrap_or_else(|| format!("postback-{}", self.timestamp)),
                MessageContent::Postback {
                    title: postback.title.clone(),
                    payload: postback.payload.clone(),
                },
                None,
            )
        } else if let Some(reaction) = self.reaction.as_ref().filter(|r| r.action == "react") {
            (
                format!("reaction-{}-{}", reaction.mid, self.timestamp),
                MessageContent::Reaction {
                    emoji: reaction.emoji.clone().unwrap_or_default(),
                    message_id: reaction.mid.clone(),
                },
                Some(reaction.mid.clone()),
            )
        } else {
            return None;
        };

        Some(NormalizedMessage {
            id,
            recipient_id: self.recipient.id.clone(),
            sender_name: None,
            timestamp: self.timestamp / 1000,
            content,
            reply_to,
        })
    }
}

fn message_content(message: &MessageNode) -> MessageContent {
    if let Some(quick_reply) = &message.quick_reply {
        return MessageContent::Postback {
            title: message.text.clone().unwrap_or_default(),
            payload: quick_reply.payload.clone(),
        };
    }
    if let Some(text) = message.text.as_ref().filter(|t| !t.is_empty()) {
        return MessageContent::Text { text: text.clone() };
    }
    match message.attachments.first() {
        Some(Attachment {
            payload:
                Some(AttachmentPayload {
                    coordinates: Some(at),
                    ..
                }),
            ..
        }) => MessageContent::Location {
            latitude: at.lat,
            longitude: at.long,
            name: None,
        },
        Some(attachment) => MessageContent::Media {
            kind: attachment.kind.clone(),
            media_id: None,
            url: attachment.payload.as_ref().and_then(|p| p.url.clone()),
            mime_type: None,
            caption: None,
        },
        None => MessageContent::Unsupported {
            kind: "message".into(),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn event(json: serde_json::Value) -> MessagingEvent {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn text_message() {
        let ev = event(serde_json::json!({
            "sender": {"id": "psid-1"},
            "recipient": {"id": "page-1"},
            "timestamp": 1_700_000_000_123_i64,
            "message": {"mid": "m_1", "text": "hello", "reply_to": {"mid": "m_0"}}
        }));
        let msg = ev.normalize().unwrap();
        assert_eq!(msg.id, "m_1");
        assert_eq!(msg.timestamp, 1_700_000_000);
        assert_eq!(msg.recipient_id, "page-1");
        assert_eq!(msg.reply_to.as_deref(), Some("m_0"));
        assert_eq!(msg.content, MessageContent::Text {
            text: "hello".into()
        });
    }

    #[test]
    fn quick_reply_is_postback() {
        let ev = event(serde_json::json!({
            "sender": {"id": "psid-1"},
            "recipient": {"id": "page-1"},
            "timestamp": 1,
            "message": {"mid": "m_2", "text": "Red", "quick_reply": {"payload": "COLOR_RED"}}
        }));
        assert_eq!(ev.normalize().unwrap().content, MessageContent::Postback {
            title: "Red".into(),
            payload: "COLOR_RED".into()
        });
    }

    #[test]
    fn attachment_is_media() {
        let ev = event(serde_json::json!({
            "sender": {"id": "psid-1"},
            "recipient": {"id": "page-1"},
            "timestamp": 1,
            "message": {"mid": "m_3", "attachments": [{"type": "image", "payload": {"url": "https://cdn/x.jpg"}}]}
        }));
        match ev.normalize().unwrap().content {
            MessageContent::Media { kind, url, .. } => {
                assert_eq!(kind, "image");
                assert_eq!(url.as_deref(), Some("https://cdn/x.jpg"));
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn echoes_and_reads_are_recognized() {
        let echo = event(serde_json::json!({
            "sender": {"id": "page-1"},
            "recipient": {"id": "psid-1"},
            "message": {"mid": "m_4", "text": "sent by us", "is_echo": true}
        }));
        assert!(echo.is_echo());

        let read = event(serde_json::json!({
            "sender": {"id": "psid-1"},
            "recipient": {"id": "page-1"},
            "read": {"watermark": 1}
        }));
        assert!(read.normalize().is_none());

        let unreact = event(serde_json::json!({
            "sender": {"id": "psid-1"},
            "recipient": {"id": "page-1"},
            "reaction": {"mid": "m_1", "action": "unreact"}
        }));
        assert!(unreact.normalize().is_none());
    }
}
