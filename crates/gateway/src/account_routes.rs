//! Admin surface over the account registries.

use std::sync::Arc;

use {
    axum::{
        Json,
        extract::{Path, Query, State},
        response::Redirect,
        routing::{get, post},
    },
    secrecy::Secret,
    serde::{Deserialize, Serialize},
    switchboard_channels::{
        Account, AccountSummary, FailedAccount, PlatformPlugin, SubscriptionReport,
    },
    switchboard_common::Platform,
    tracing::{info, warn},
};

use crate::{
    error::{Error, Result},
    onboarding::{OnboardReport, onboard},
    persistence,
    state::GatewayState,
};

/// Routes mounted under `/api/{platform}`.
pub fn account_router() -> axum::Router<Arc<GatewayState>> {
    axum::Router::new()
        .route("/accounts", get(list_handler))
        .route("/accounts/subscribe", post(subscribe_handler))
        .route("/accounts/unsubscribe", post(unsubscribe_handler))
        .route("/accounts/remove", post(remove_handler))
        .route("/setup", get(setup_handler))
        .route("/token", post(token_handler))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// Comma-separated account ids.
    #[serde(default)]
    ids: Option<String>,
    /// Case-insensitive substring of id or name.
    #[serde(default)]
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IdsRequest {
    #[serde(default)]
    ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RemoveReport {
    pub removed: Vec<String>,
    pub failed: Vec<FailedAccount>,
}

// ── Listing ──────────────────────────────────────────────────────────────────

async fn list_handler(
    State(state): State<Arc<GatewayState>>,
    Path(platform): Path<Platform>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<AccountSummary>>> {
    let plugin = state.plugin(platform)?;
    let ids = split_ids(params.ids.as_deref());
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase);

    let mut accounts = plugin.registry().get_many(&ids);
    accounts.sort_by(|a, b| a.id.cmp(&b.id));
    let summaries = accounts
        .iter()
        .filter(|a| query.as_deref().is_none_or(|q| matches_query(a, q)))
        .map(Account::summary)
        .collect();
    Ok(Json(summaries))
}

fn split_ids(ids: Option<&str>) -> Vec<String> {
    ids.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect()
}

fn matches_query(account: &Account, query: &str) -> bool {
    account.id.to_lowercase().contains(query) || account.name.to_lowercase().contains(query)
}

// ── Subscription changes ─────────────────────────────────────────────────────

/// Every requested id must be registered; acting on a subset is refused.
fn resolve_all(plugin: &dyn PlatformPlugin, ids: &[String]) -> Result<Vec<Account>> {
    if ids.is_empty() {
        return Err(Error::bad_request("ids must not be empty"));
    }
    Ok(plugin.registry().resolve(ids)?)
}

async fn subscribe_handler(
    State(state): State<Arc<GatewayState>>,
    Path(platform): Path<Platform>,
    Json(req): Json<IdsRequest>,
) -> Result<Json<SubscriptionReport>> {
    let plugin = state.plugin(platform)?;
    let accounts = resolve_all(plugin.as_ref(), &req.ids)?;
    let report = plugin.subscribe(accounts, state.deadline()).await?;
    persistence::backup(&state, plugin.as_ref()).await;
    Ok(Json(report))
}

async fn unsubscribe_handler(
    State(state): State<Arc<GatewayState>>,
    Path(platform): Path<Platform>,
    Json(req): Json<IdsRequest>,
) -> Result<Json<SubscriptionReport>> {
    let plugin = state.plugin(platform)?;
    let accounts = resolve_all(plugin.as_ref(), &req.ids)?;
    let report = plugin.unsubscribe(accounts, state.deadline()).await?;
    persistence::backup(&state, plugin.as_ref()).await;
    Ok(Json(report))
}

/// Unsubscribe, then forget the accounts. Unsubscribe failures are reported
/// but do not keep an account registered.
async fn remove_handler(
    State(state): State<Arc<GatewayState>>,
    Path(platform): Path<Platform>,
    Json(req): Json<IdsRequest>,
) -> Result<Json<RemoveReport>> {
    let plugin = state.plugin(platform)?;
    let accounts = resolve_all(plugin.as_ref(), &req.ids)?;

    let failed = match plugin.unsubscribe(accounts, state.deadline()).await {
        Ok(report) => report.failed,
        Err(e) => {
            warn!(%platform, error = %e, "unsubscribe before removal failed");
            req.ids
                .iter()
                .map(|id| FailedAccount {
                    id: id.clone(),
                    error: e.to_string(),
                })
                .collect()
        },
    };

    let removed: Vec<String> = plugin
        .registry()
        .delete(&req.ids)
        .into_iter()
        .map(|a| a.id)
        .collect();
    info!(%platform, removed = removed.len(), "accounts removed");
    persistence::backup(&state, plugin.as_ref()).await;
    Ok(Json(RemoveReport { removed, failed }))
}

// ── Authorization entry points ───────────────────────────────────────────────

/// Send the operator to the platform's authorization dialog.
async fn setup_handler(
    State(state): State<Arc<GatewayState>>,
    Path(platform): Path<Platform>,
) -> Result<Redirect> {
    let plugin = state.plugin(platform)?;
    let request = state
        .flow
        .start(platform, plugin.scopes(), &state.redirect_uri(platform))?;
    Ok(Redirect::to(&request.url))
}

#[derive(Deserialize)]
pub struct TokenRequest {
    access_token: String,
}

/// Onboard the accounts reachable with a token obtained outside the
/// authorization dialog (for example a system user token).
async fn token_handler(
    State(state): State<Arc<GatewayState>>,
    Path(platform): Path<Platform>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<OnboardReport>> {
    let plugin = state.plugin(platform)?;
    let token = req.access_token.trim();
    if token.is_empty() {
        return Err(Error::bad_request("access_token must not be empty"));
    }
    let deadline = state.deadline();
    let credential = state
        .broker
        .authorize_token(Secret::new(token.to_string()), plugin.scopes(), deadline)
        .await?;
    let report = onboard(&state, plugin.as_ref(), credential, deadline).await?;
    Ok(Json(report))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_split_and_trimmed() {
        assert_eq!(split_ids(Some("a, b,,c ")), vec!["a", "b", "c"]);
        assert!(split_ids(None).is_empty());
        assert!(split_ids(Some(" , ")).is_empty());
    }

    #[test]
    fn query_matches_id_or_name() {
        let account = Account::business("waba-17", "Acme Foods");
        assert!(matches_query(&account, "acme"));
        assert!(matches_query(&account, "17"));
        assert!(!matches_query(&account, "globex"));
    }
}
