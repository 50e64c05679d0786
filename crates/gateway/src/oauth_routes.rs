//! Callbacks the platform sends users and notices to.

use std::sync::Arc;

use {
    axum::{
        Form, Json,
        extract::{Path, Query, State},
        http::StatusCode,
        response::{Html, IntoResponse, Response},
        routing::{get, post},
    },
    serde::Deserialize,
    switchboard_common::Platform,
    switchboard_graph::signed_request::{DeauthorizeRequest, parse_signed_request},
    switchboard_oauth::CallbackParams,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    onboarding::{OnboardReport, onboard},
    persistence,
    state::GatewayState,
};

/// Routes mounted under `/oauth/{platform}`.
pub fn oauth_router() -> axum::Router<Arc<GatewayState>> {
    axum::Router::new()
        .route("/callback", get(callback_handler))
        .route("/deauthorize", post(deauthorize_handler))
}

// ── Authorization callback ───────────────────────────────────────────────────

async fn callback_handler(
    State(state): State<Arc<GatewayState>>,
    Path(platform): Path<Platform>,
    Query(params): Query<CallbackParams>,
) -> Response {
    match complete_authorization(&state, platform, &params).await {
        Ok(report) => Html(success_page(platform, &report)).into_response(),
        Err(e) => {
            warn!(%platform, error = %e, "authorization callback failed");
            (e.status(), Html(failure_page(platform, &e))).into_response()
        },
    }
}

async fn complete_authorization(
    state: &GatewayState,
    platform: Platform,
    params: &CallbackParams,
) -> Result<OnboardReport> {
    let plugin = state.plugin(platform)?;
    let flow_state = params
        .state
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::bad_request("missing authorization state"))?;
    let redirect_uri = state.flow.redeem(flow_state, platform)?;
    let code = params.code()?;

    let deadline = state.deadline();
    let credential = state
        .broker
        .exchange_code(code, &redirect_uri, plugin.scopes(), deadline)
        .await?;
    onboard(state, plugin.as_ref(), credential, deadline).await
}

fn success_page(platform: Platform, report: &OnboardReport) -> String {
    let subscriptions = &report.subscriptions;
    let mut html = format!(
        "<h1>Authorization complete</h1><p>{} {platform} account(s) found, {} subscribed.</p>",
        report.discovered,
        subscriptions.succeeded.len(),
    );
    if !subscriptions.failed.is_empty() {
        html.push_str("<p>Some accounts could not be subscribed:</p><ul>");
        for failed in &subscriptions.failed {
            html.push_str(&format!(
                "<li>{}: {}</li>",
                escape_html(&failed.id),
                escape_html(&failed.error)
            ));
        }
        html.push_str("</ul>");
    }
    html.push_str("<p>You can close this window.</p>");
    html
}

fn failure_page(platform: Platform, error: &Error) -> String {
    let hint = match error.authorization_reason() {
        Some(reason) => format!("<p>Reason: {reason}</p>"),
        None => String::new(),
    };
    format!(
        "<h1>Authorization failed</h1><p>Could not connect {platform} accounts: {}</p>{hint}",
        escape_html(&error.to_string())
    )
}

/// Escape HTML special characters.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// ── Deauthorize notice ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DeauthorizeForm {
    #[serde(default)]
    signed_request: String,
}

/// A user removed the app: forget every account their authorization added.
async fn deauthorize_handler(
    State(state): State<Arc<GatewayState>>,
    Path(platform): Path<Platform>,
    Form(form): Form<DeauthorizeForm>,
) -> Result<Response> {
    let plugin = state.plugin(platform)?;
    let notice: DeauthorizeRequest =
        match parse_signed_request(&form.signed_request, state.app_secret()) {
            Ok(notice) => notice,
            Err(e) => {
                warn!(%platform, error = %e, "deauthorize notice rejected");
                return Ok((StatusCode::FORBIDDEN, e.to_string()).into_response());
            },
        };

    if notice.is_self_triggered() {
        debug!(%platform, "ignoring deauthorize notice caused by our own unlink");
        return Ok(Json(serde_json::json!({ "removed": 0 })).into_response());
    }

    let registry = plugin.registry();
    let removed = if notice.profile_id.is_empty() {
        registry.delete_authorized_by(&notice.user_id).len()
    } else {
        match registry.get(&notice.profile_id) {
            Some(account) if account.authorized_by.as_deref() == Some(notice.user_id.as_str()) => {
                registry.delete(std::slice::from_ref(&notice.profile_id)).len()
            },
            _ => 0,
        }
    };

    info!(%platform, user_id = %notice.user_id, removed, "deauthorize notice processed");
    if removed > 0 {
        persistence::backup(&state, plugin.as_ref()).await;
    }
    Ok(Json(serde_json::json!({ "removed": removed })).into_response())
}
