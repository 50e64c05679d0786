//! Inbound `page` and `instagram` deliveries.

use {
    switchboard_channels::{AccountRegistry, ConversationEngine, Result},
    switchboard_common::Network,
    switchboard_graph::event::{Event, OBJECT_INSTAGRAM},
    tracing::{debug, warn},
};

use crate::types::MessagingEvent;

/// Deliver every messaging event of `event` to `engine`.
///
/// Page entries are addressed by page id, Instagram entries by the linked
/// profile id; both resolve to the owning page. Echoes of our own messages
/// are skipped.
pub async fn dispatch(
    registry: &AccountRegistry,
    engine: &dyn ConversationEngine,
    event: &Event,
) -> Result<usize> {
    let network = if event.object == OBJECT_INSTAGRAM {
        Network::Instagram
    } else {
        Network::Messenger
    };

    let mut delivered = 0;
    for entry in &event.entry {
        let Some(page) = registry.resolve_recipient(&entry.id) else {
            debug!(%network, recipient = %entry.id, "delivery for unknown page");
            continue;
        };

        for raw in &entry.messaging {
            let messaging: MessagingEvent = match serde_json::from_value(raw.clone()) {
                Ok(m) => m,
                Err(e) => {
                    warn!(page_id = %page.id, error = %e, "undecodable messaging event");
                    continue;
                },
            };
            if messaging.is_echo() {
                continue;
            }
            let Some(message) = messaging.normalize() else {
                debug!(page_id = %page.id, "messaging event without message");
                continue;
            };

            let message_id = message.id.clone();
            match engine
                .deliver(network, &page.id, &messaging.sender.id, message)
                .await
            {
                Ok(handle) => {
                    delivered += 1;
                    debug!(page_id = %page.id, %network, conversation = %handle.id, "message delivered");
                },
                Err(e) => {
                    warn!(page_id = %page.id, %message_id, error = %e, "delivery failed");
                },
            }
        }
    }
    Ok(delivered)
}
