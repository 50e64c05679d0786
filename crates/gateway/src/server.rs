use std::{collections::BTreeMap, sync::Arc};

use {
    axum::{
        Router,
        extract::State,
        response::{IntoResponse, Json},
        routing::get,
    },
    sqlx::sqlite::{SqliteConnectOptions, SqlitePool},
    switchboard_channels::{ConversationEngine, MemoryMetadataStore, MetadataStore},
    switchboard_config::SwitchboardConfig,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use crate::{
    account_routes::account_router,
    engine::{ForwardEngine, LoggingEngine},
    metadata_store::SqliteMetadataStore,
    oauth_routes::oauth_router,
    persistence,
    state::GatewayState,
    webhook_routes::{event_handler, handshake_handler},
};

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    // Only the admin API is called from browsers.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/webhook", get(handshake_handler).post(event_handler))
        .nest("/api/{platform}", account_router().layer(cors))
        .nest("/oauth/{platform}", oauth_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn start_gateway(config: SwitchboardConfig) -> anyhow::Result<()> {
    let http = reqwest::Client::builder()
        .timeout(config.server.request_timeout())
        .build()?;

    let store = open_store(&config).await?;
    let engine: Arc<dyn ConversationEngine> = match config.engine.forward_url.as_deref() {
        Some(url) => {
            info!(url, "forwarding inbound messages");
            Arc::new(ForwardEngine::new(http.clone(), url))
        },
        None => {
            warn!("no engine.forward_url configured, inbound messages are only logged");
            Arc::new(LoggingEngine::new())
        },
    };

    let state = GatewayState::from_config(&config, http, store, engine);
    if state.platforms.is_empty() {
        warn!("no platform is enabled");
    }

    let restored = persistence::restore_all(&state).await;
    if restored > 0 {
        tokio::spawn(persistence::revalidate_all(Arc::clone(&state)));
    }

    let app = build_gateway_app(Arc::clone(&state));
    let listener =
        tokio::net::TcpListener::bind((config.server.bind.as_str(), config.server.port)).await?;
    let addr = listener.local_addr()?;
    info!(
        %addr,
        public_url = %state.base_url,
        platforms = state.platforms.len(),
        restored,
        "switchboard gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("switchboard gateway stopped");
    Ok(())
}

/// SQLite store at the configured path, or a process-local store when
/// persistence is switched off with `database = ":memory:"`.
async fn open_store(config: &SwitchboardConfig) -> anyhow::Result<Arc<dyn MetadataStore>> {
    let path = config
        .storage
        .database
        .clone()
        .unwrap_or_else(|| switchboard_config::data_dir().join("switchboard.db"));
    if path.as_os_str() == ":memory:" {
        warn!("registry backups are kept in memory only");
        return Ok(Arc::new(MemoryMetadataStore::new()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    SqliteMetadataStore::init(&pool).await?;
    info!(path = %path.display(), "metadata store opened");
    Ok(Arc::new(SqliteMetadataStore::new(pool)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let accounts: BTreeMap<String, usize> = state
        .platforms
        .all()
        .iter()
        .map(|p| (p.platform().to_string(), p.registry().len()))
        .collect();
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "accounts": accounts,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        axum::{body::Body, http::Request},
        secrecy::Secret,
        tower::ServiceExt,
    };

    fn state() -> Arc<GatewayState> {
        let mut config = SwitchboardConfig::default();
        config.meta.app_id = "42".into();
        config.meta.verify_token = Secret::new("hub-token".into());
        config.whatsapp.enabled = true;
        GatewayState::from_config(
            &config,
            reqwest::Client::new(),
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(LoggingEngine::new()),
        )
    }

    async fn body_string(resp: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_counts_accounts_per_platform() {
        let app = build_gateway_app(state());
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body["accounts"]["whatsapp"], 0);
        assert!(body["accounts"].get("messenger").is_none());
    }

    #[tokio::test]
    async fn handshake_echoes_challenge() {
        let app = build_gateway_app(state());
        let resp = app
            .oneshot(
                Request::get(
                    "/webhook?hub.mode=subscribe&hub.verify_token=hub-token&hub.challenge=1158201444",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(body_string(resp).await, "1158201444");
    }

    #[tokio::test]
    async fn handshake_refusals() {
        let app = build_gateway_app(state());
        let wrong_token = app
            .clone()
            .oneshot(
                Request::get("/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong_token.status(), 403);

        let wrong_mode = app
            .oneshot(
                Request::get("/webhook?hub.mode=unsubscribe&hub.verify_token=hub-token&hub.challenge=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong_mode.status(), 400);
    }

    #[tokio::test]
    async fn disabled_platform_is_not_found() {
        let app = build_gateway_app(state());
        let resp = app
            .oneshot(
                Request::get("/api/messenger/accounts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn setup_redirects_to_dialog() {
        let state = state();
        let app = build_gateway_app(Arc::clone(&state));
        let resp = app
            .oneshot(Request::get("/api/whatsapp/setup").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.status().is_redirection());
        let location = resp.headers()["location"].to_str().unwrap();
        assert!(location.starts_with("https://www.facebook.com/v12.0/dialog/oauth?"));
        assert!(location.contains("client_id=42"));
        assert_eq!(state.flow.pending(), 1);
    }
}
