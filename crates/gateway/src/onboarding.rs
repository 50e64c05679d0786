//! Bringing newly authorized accounts under management.

use {
    serde::Serialize,
    switchboard_channels::{PlatformPlugin, SubscriptionReport},
    switchboard_graph::Deadline,
    switchboard_oauth::Credential,
    tracing::{info, warn},
};

use crate::{error::Result, persistence, state::GatewayState};

/// Outcome of onboarding the accounts reachable with one credential.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OnboardReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_by: Option<String>,
    pub discovered: usize,
    #[serde(flatten)]
    pub subscriptions: SubscriptionReport,
}

/// Discover the accounts `credential` reaches, merge them as fresh
/// snapshots, subscribe them and back the registry up.
pub async fn onboard(
    state: &GatewayState,
    plugin: &dyn PlatformPlugin,
    credential: Credential,
    deadline: Deadline,
) -> Result<OnboardReport> {
    let platform = plugin.platform();
    let authorized_by = match state.broker.token_user(credential.token(), deadline).await {
        Ok(user_id) => Some(user_id),
        Err(e) => {
            warn!(%platform, error = %e, "could not resolve authorizing user");
            None
        },
    };

    let mut accounts = plugin.discover(&credential, deadline).await?;
    for account in &mut accounts {
        account.authorized_by.clone_from(&authorized_by);
    }
    let ids: Vec<String> = accounts.iter().map(|a| a.id.clone()).collect();
    let discovered = ids.len();
    if discovered == 0 {
        info!(%platform, "authorization reached no accounts");
        return Ok(OnboardReport {
            authorized_by,
            ..Default::default()
        });
    }

    let registry = plugin.registry();
    registry.merge_all(accounts, true);
    let subscriptions = plugin.subscribe(registry.get_many(&ids), deadline).await;
    persistence::backup(state, plugin).await;
    let subscriptions = subscriptions?;

    info!(
        %platform,
        discovered,
        subscribed = subscriptions.succeeded.len(),
        failed = subscriptions.failed.len(),
        "accounts onboarded"
    );
    Ok(OnboardReport {
        authorized_by,
        discovered,
        subscriptions,
    })
}
