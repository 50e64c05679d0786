//! Conversation engine adapters.
//!
//! The gateway does not own conversations: resolved inbound messages are
//! either POSTed to an external engine or, when none is configured, logged.

use std::sync::atomic::{AtomicU64, Ordering};

use {
    anyhow::{Context, Result, bail},
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    switchboard_channels::{ConversationEngine, ConversationHandle, NormalizedMessage},
    switchboard_common::Network,
    tracing::{debug, info},
};

/// Body POSTed to the forward URL.
#[derive(Debug, Serialize)]
struct ForwardRequest<'a> {
    network: Network,
    account_id: &'a str,
    sender_id: &'a str,
    message: &'a NormalizedMessage,
}

#[derive(Debug, Deserialize)]
struct ForwardResponse {
    #[serde(default)]
    conversation_id: Option<String>,
}

/// Forwards every inbound message to an HTTP endpoint as JSON.
pub struct ForwardEngine {
    client: reqwest::Client,
    url: String,
}

impl ForwardEngine {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ConversationEngine for ForwardEngine {
    async fn deliver(
        &self,
        network: Network,
        account_id: &str,
        sender_id: &str,
        message: NormalizedMessage,
    ) -> Result<ConversationHandle> {
        let message_id = message.id.clone();
        let resp = self
            .client
            .post(&self.url)
            .json(&ForwardRequest {
                network,
                account_id,
                sender_id,
                message: &message,
            })
            .send()
            .await
            .context("failed to reach conversation engine")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("conversation engine returned HTTP {status}: {body}");
        }

        // An empty or non-JSON body still counts as accepted.
        let body = resp.text().await.unwrap_or_default();
        let conversation_id = serde_json::from_str::<ForwardResponse>(&body)
            .ok()
            .and_then(|r| r.conversation_id)
            .unwrap_or_else(|| format!("{network}:{account_id}:{sender_id}"));
        debug!(%network, account_id, message_id, "message forwarded");
        Ok(ConversationHandle {
            id: conversation_id,
        })
    }
}

impl std::fmt::Debug for ForwardEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardEngine")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Logs inbound messages instead of delivering them anywhere.
#[derive(Debug, Default)]
pub struct LoggingEngine {
    delivered: AtomicU64,
}

impl LoggingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages seen so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ConversationEngine for LoggingEngine {
    async fn deliver(
        &self,
        network: Network,
        account_id: &str,
        sender_id: &str,
        message: NormalizedMessage,
    ) -> Result<ConversationHandle> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        info!(
            %network,
            account_id,
            sender_id,
            message_id = %message.id,
            "inbound message (no engine configured)"
        );
        Ok(ConversationHandle {
            id: format!("{network}:{account_id}:{sender_id}"),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, mockito::Matcher, switchboard_channels::MessageContent};

    fn message() -> NormalizedMessage {
        NormalizedMessage {
            id: "wamid.1".into(),
            recipient_id: "phone-1".into(),
            sender_name: Some("Ada".into()),
            timestamp: 1_700_000_000,
            content: MessageContent::Text { text: "hi".into() },
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn forwards_json_and_reads_conversation_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/inbound")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "network": "whatsapp",
                "account_id": "waba-1",
                "sender_id": "15551234567",
                "message": {"id": "wamid.1", "content": {"type": "text", "text": "hi"}},
            })))
            .with_body(r#"{"conversation_id":"conv-9"}"#)
            .create_async()
            .await;

        let engine = ForwardEngine::new(reqwest::Client::new(), format!("{}/inbound", server.url()));
        let handle = engine
            .deliver(Network::WhatsApp, "waba-1", "15551234567", message())
            .await
            .unwrap();
        assert_eq!(handle.id, "conv-9");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_body_gets_a_derived_handle() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/inbound")
            .with_status(202)
            .create_async()
            .await;

        let engine = ForwardEngine::new(reqwest::Client::new(), format!("{}/inbound", server.url()));
        let handle = engine
            .deliver(Network::Instagram, "page-1", "igsid-1", message())
            .await
            .unwrap();
        assert_eq!(handle.id, "instagram:page-1:igsid-1");
    }

    #[tokio::test]
    async fn http_errors_fail_delivery() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/inbound")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let engine = ForwardEngine::new(reqwest::Client::new(), format!("{}/inbound", server.url()));
        let err = engine
            .deliver(Network::Messenger, "page-1", "psid-1", message())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn logging_engine_counts() {
        let engine = LoggingEngine::new();
        engine
            .deliver(Network::WhatsApp, "waba-1", "1555", message())
            .await
            .unwrap();
        assert_eq!(engine.delivered(), 1);
    }
}
