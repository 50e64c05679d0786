//! Inbound `whatsapp_business_account` deliveries.

use {
    switchboard_channels::{AccountRegistry, ConversationEngine, Result},
    switchboard_common::Network,
    switchboard_graph::event::{Entry, Event},
    tracing::{debug, warn},
};

use crate::types::MessagesValue;

/// Resolve every message of `event` to its business account by phone
/// number id and hand it to `engine`. Returns the number delivered.
///
/// Changes for unknown phone numbers are dropped; a failed delivery is
/// logged and does not stop the remaining messages.
pub async fn dispatch(
    registry: &AccountRegistry,
    engine: &dyn ConversationEngine,
    event: &Event,
) -> Result<usize> {
    let mut delivered = 0;
    for entry in &event.entry {
        delivered += dispatch_entry(registry, engine, entry).await;
    }
    Ok(delivered)
}

async fn dispatch_entry(
    registry: &AccountRegistry,
    engine: &dyn ConversationEngine,
    entry: &Entry,
) -> usize {
    let mut delivered = 0;
    for change in &entry.changes {
        if change.field != "messages" {
            debug!(account_id = %entry.id, field = %change.field, "ignoring webhook field");
            continue;
        }
        let value: MessagesValue = match change.value_as() {
            Ok(v) => v,
            Err(e) => {
                warn!(account_id = %entry.id, error = %e, "undecodable messages change");
                continue;
            },
        };
        let Some(phone_number_id) = value.metadata.as_ref().map(|m| m.phone_number_id.as_str())
        else {
            debug!(account_id = %entry.id, "messages change without metadata");
            continue;
        };
        let Some(account) = registry.lookup(phone_number_id) else {
            debug!(phone_number_id, "delivery for unknown phone number");
            continue;
        };

        for status in &value.statuses {
            debug!(
                phone_number_id,
                message_id = %status.id,
                status = %status.status,
                recipient_id = %status.recipient_id,
                "message status"
            );
        }
        for error in &value.errors {
            warn!(phone_number_id, %error, "delivery error reported");
        }

        for message in &value.messages {
            let normalized = message.normalize(phone_number_id, value.contact_name(&message.from));
            match engine
                .deliver(Network::WhatsApp, &account.id, &message.from, normalized)
                .await
            {
                Ok(handle) => {
                    delivered += 1;
                    debug!(
                        account_id = %account.id,
                        phone_number_id,
                        conversation = %handle.id,
                        "message delivered"
                    );
                },
                Err(e) => {
                    warn!(account_id = %account.id, message_id = %message.id, error = %e, "delivery failed");
                },
            }
        }
    }
    delivered
}
