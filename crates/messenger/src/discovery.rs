use std::collections::HashSet;

use {
    secrecy::Secret,
    switchboard_channels::{Account, InstagramLink, Result},
    switchboard_graph::{BATCH_LIMIT, BatchOperation, Deadline, GraphClient},
    switchboard_oauth::Credential,
    tracing::{debug, warn},
};

use crate::types::{Edge, PageNode, SubscribedApp};

/// Granular scope whose targets are pages shared with the app.
pub const SHARED_PAGE_SCOPES: [&str; 1] = ["pages_messaging"];

pub(crate) const PAGE_FIELDS: &str = "id,name,access_token,instagram_business_account{id,username}";

/// Pages the user manages, plus pages shared with the app that the listing
/// leaves out. Each page carries its own page token when one was returned.
pub async fn list_pages(
    graph: &GraphClient,
    credential: &Credential,
    deadline: Deadline,
) -> Result<Vec<Account>> {
    let token = credential.token();
    let listed: Vec<PageNode> = graph
        .get_edge("me/accounts", PAGE_FIELDS, token, deadline)
        .await?;

    let known: HashSet<&str> = listed.iter().map(|p| p.id.as_str()).collect();
    let shared: Vec<String> = credential
        .shared_targets(&SHARED_PAGE_SCOPES)
        .into_iter()
        .filter(|id| !known.contains(id.as_str()))
        .collect();
    debug!(listed = listed.len(), shared = shared.len(), "pages found");

    let mut pages: Vec<Account> = listed.into_iter().map(to_account).collect();
    pages.extend(fetch_pages(graph, &shared, token, deadline).await?);
    Ok(pages)
}

/// Read `ids` in one call, preserving the requested order.
pub async fn fetch_pages(
    graph: &GraphClient,
    ids: &[String],
    token: &Secret<String>,
    deadline: Deadline,
) -> Result<Vec<Account>> {
    let mut nodes = graph
        .get_nodes::<PageNode>(ids, PAGE_FIELDS, token, deadline)
        .await?;
    Ok(ids
        .iter()
        .filter_map(|id| nodes.remove(id))
        .map(to_account)
        .collect())
}

fn to_account(node: PageNode) -> Account {
    let mut account = Account::page(node.id, node.name);
    if let Some(token) = node.access_token.filter(|t| !t.is_empty()) {
        account = account.with_credential(Credential::new(token));
    }
    if let Some(ig) = node.instagram_business_account {
        account = account.with_instagram(InstagramLink {
            id: ig.id,
            username: ig.username.unwrap_or_default(),
        });
    }
    account
}

/// Fill in `subscribed_fields` of every page from `{page}/subscribed_apps`,
/// read in batches with each page's own token.
///
/// A page whose read fails keeps an empty field set.
pub async fn load_subscriptions(
    graph: &GraphClient,
    pages: &mut [Account],
    app_id: &str,
    deadline: Deadline,
) -> Result<()> {
    let readable: Vec<usize> = pages
        .iter()
        .enumerate()
        .filter(|(_, p)| p.credential.is_some())
        .map(|(i, _)| i)
        .collect();

    for chunk in readable.chunks(BATCH_LIMIT) {
        let ops: Vec<BatchOperation> = chunk
            .iter()
            .filter_map(|&i| {
                let page = &pages[i];
                let credential = page.credential.as_ref()?;
                Some(
                    BatchOperation::get(format!("{}/subscribed_apps", page.id))
                        .param("fields", "id,subscribed_fields")
                        .authorized(credential.token().clone()),
                )
            })
            .collect();
        let results = graph.execute_raw(&ops, deadline).await?;

        for (&i, result) in chunk.iter().zip(results) {
            let page = &mut pages[i];
            let decoded = result
                .filter(|r| r.code < 300)
                .and_then(|r| serde_json::from_str::<Edge<SubscribedApp>>(&r.body).ok());
            match decoded {
                Some(apps) => {
                    page.subscribed_fields = apps
                        .data
                        .into_iter()
                        .find(|app| app.id.is_empty() || app.id == app_id)
                        .map(|app| app.subscribed_fields)
                        .unwrap_or_default();
                },
                None => warn!(page_id = %page.id, "could not read page subscription state"),
            }
        }
    }
    Ok(())
}
