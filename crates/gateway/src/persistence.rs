//! Registry backup lifecycle.
//!
//! Each registry is stored under `backup:<platform>` in the metadata store as
//! unpadded base64url of its snapshot. Restoring never fails startup: a
//! missing or unreadable blob leaves the registry empty.

use std::sync::Arc;

use {
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    switchboard_channels::{Error as ChannelError, PlatformPlugin, backup_key},
    tracing::{debug, info, warn},
};

use crate::state::GatewayState;

/// Persist the current registry of `plugin`. Failures are logged; the
/// in-memory registry stays authoritative.
pub async fn backup(state: &GatewayState, plugin: &dyn PlatformPlugin) {
    let platform = plugin.platform();
    let registry = plugin.registry();
    let encoded = URL_SAFE_NO_PAD.encode(registry.backup());
    match state.store.set(&backup_key(platform), &encoded).await {
        Ok(()) => debug!(%platform, accounts = registry.len(), "registry backed up"),
        Err(e) => warn!(%platform, error = %e, "failed to back up registry"),
    }
}

/// Restore `plugin`'s registry from its stored backup. Returns how many
/// accounts were restored.
pub async fn restore(state: &GatewayState, plugin: &dyn PlatformPlugin) -> usize {
    let platform = plugin.platform();
    let encoded = match state.store.get(&backup_key(platform)).await {
        Ok(Some(encoded)) => encoded,
        Ok(None) => {
            debug!(%platform, "no registry backup stored");
            return 0;
        },
        Err(e) => {
            warn!(%platform, error = %e, "failed to read registry backup, starting empty");
            return 0;
        },
    };

    let bytes = match URL_SAFE_NO_PAD.decode(encoded.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(%platform, error = %e, "registry backup is not valid base64, starting empty");
            return 0;
        },
    };

    match plugin.registry().restore(&bytes) {
        Ok(restored) => {
            info!(%platform, restored, "registry restored");
            restored
        },
        Err(e) => {
            warn!(%platform, error = %e, "registry backup is corrupt, starting empty");
            0
        },
    }
}

/// Restore every enabled platform.
pub async fn restore_all(state: &GatewayState) -> usize {
    let mut total = 0;
    for plugin in state.platforms.all() {
        total += restore(state, plugin.as_ref()).await;
    }
    total
}

/// Refetch restored accounts of every platform that has a long-lived token,
/// backing up each refreshed registry.
pub async fn revalidate_all(state: Arc<GatewayState>) {
    for plugin in state.platforms.all() {
        let platform = plugin.platform();
        if plugin.registry().is_empty() {
            continue;
        }
        match plugin.revalidate(state.deadline()).await {
            Ok(refreshed) => {
                info!(%platform, refreshed, "restored accounts revalidated");
                backup(&state, plugin.as_ref()).await;
            },
            Err(ChannelError::Unavailable { message }) => {
                info!(%platform, reason = %message, "revalidation skipped");
            },
            Err(e) => warn!(%platform, error = %e, "revalidation failed"),
        }
    }
}
