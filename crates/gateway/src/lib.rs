//! HTTP gateway: webhook intake, admin API, OAuth callbacks and the registry
//! backup lifecycle, wired over the platform plugins.
//!
//! Routes:
//! - `GET|POST /webhook` subscription handshake and signed deliveries
//! - `/api/{platform}/accounts[/subscribe|/unsubscribe|/remove]`
//! - `GET /api/{platform}/setup`, `POST /api/{platform}/token`
//! - `GET /oauth/{platform}/callback`, `POST /oauth/{platform}/deauthorize`
//! - `GET /health`

pub mod account_routes;
pub mod engine;
pub mod error;
pub mod metadata_store;
pub mod oauth_routes;
pub mod onboarding;
pub mod persistence;
pub mod server;
pub mod state;
pub mod webhook_routes;

pub use {
    error::{Error, Result},
    server::{build_gateway_app, start_gateway},
    state::GatewayState,
};
