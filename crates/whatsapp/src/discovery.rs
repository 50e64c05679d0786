use {
    secrecy::Secret,
    switchboard_channels::{Account, PhoneNumber, Result},
    switchboard_graph::{Deadline, GraphClient},
    switchboard_oauth::Credential,
    tracing::debug,
};

use crate::types::BusinessAccountNode;

/// Granular scopes whose targets are business accounts shared with the app.
pub const SHARED_ACCOUNT_SCOPES: [&str; 2] =
    ["whatsapp_business_messaging", "whatsapp_business_management"];

pub(crate) const ACCOUNT_FIELDS: &str = "id,name,\
    phone_numbers{id,display_phone_number,verified_name},\
    subscribed_apps{whatsapp_business_api_data{id}}";

/// Business account ids shared with the app through `credential`.
pub fn shared_account_ids(credential: &Credential) -> Vec<String> {
    credential.shared_targets(&SHARED_ACCOUNT_SCOPES)
}

/// Fetch `ids` in one call and build accounts in the order requested.
///
/// Accounts our app is subscribed to carry `subscribed_fields`; ids the
/// response leaves out are skipped.
pub async fn fetch_accounts(
    graph: &GraphClient,
    ids: &[String],
    token: &Secret<String>,
    app_id: &str,
    subscribed_fields: &[String],
    deadline: Deadline,
) -> Result<Vec<Account>> {
    let mut nodes = graph
        .get_nodes::<BusinessAccountNode>(ids, ACCOUNT_FIELDS, token, deadline)
        .await?;
    debug!(requested = ids.len(), found = nodes.len(), "business accounts fetched");

    Ok(ids
        .iter()
        .filter_map(|id| nodes.remove(id))
        .map(|node| to_account(node, app_id, subscribed_fields))
        .collect())
}

fn to_account(node: BusinessAccountNode, app_id: &str, subscribed_fields: &[String]) -> Account {
    let subscribed = node.is_subscribed(app_id);
    let mut account = Account::business(node.id, node.name);
    for phone in node.phone_numbers.map(|edge| edge.data).unwrap_or_default() {
        account = account.with_phone(PhoneNumber {
            id: phone.id,
            display_phone_number: phone.display_phone_number,
            verified_name: phone.verified_name,
        });
    }
    if subscribed {
        account.subscribed_fields = subscribed_fields.to_vec();
    }
    account
}
