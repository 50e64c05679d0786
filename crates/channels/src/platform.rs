use std::{collections::HashMap, sync::Arc};

use {
    async_trait::async_trait,
    switchboard_common::Platform,
    switchboard_graph::{Deadline, event::Event},
    switchboard_oauth::Credential,
};

use crate::{
    account::Account, error::Result, registry::AccountRegistry,
    subscription::SubscriptionReport,
};

/// One platform family: its registry plus the remote operations on it.
#[async_trait]
pub trait PlatformPlugin: Send + Sync {
    fn platform(&self) -> Platform;

    fn registry(&self) -> &AccountRegistry;

    /// Permissions requested in the authorization dialog.
    fn scopes(&self) -> &[String];

    /// Webhook fields accounts get subscribed to.
    fn subscribed_fields(&self) -> &[String];

    /// Whether webhook envelopes with this `object` belong to this platform.
    fn handles_object(&self, object: &str) -> bool;

    /// Accounts reachable with a freshly authorized user credential, each
    /// carrying its own credential. Nothing is merged.
    async fn discover(&self, credential: &Credential, deadline: Deadline) -> Result<Vec<Account>>;

    async fn subscribe(&self, accounts: Vec<Account>, deadline: Deadline)
    -> Result<SubscriptionReport>;

    async fn unsubscribe(
        &self,
        accounts: Vec<Account>,
        deadline: Deadline,
    ) -> Result<SubscriptionReport>;

    /// Re-fetch every registered account with a long-lived token and merge
    /// the fresh records. Returns how many accounts were refreshed.
    async fn revalidate(&self, deadline: Deadline) -> Result<usize>;

    /// Dispatch a verified webhook envelope. Returns how many messages were
    /// delivered to the conversation engine.
    async fn handle_event(&self, event: &Event) -> Result<usize>;
}

/// The configured platform plugins, keyed by platform.
#[derive(Default, Clone)]
pub struct PlatformSet {
    plugins: HashMap<Platform, Arc<dyn PlatformPlugin>>,
}

impl PlatformSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn PlatformPlugin>) {
        self.plugins.insert(plugin.platform(), plugin);
    }

    pub fn get(&self, platform: Platform) -> Option<&Arc<dyn PlatformPlugin>> {
        self.plugins.get(&platform)
    }

    /// Plugin handling webhook envelopes with `object`.
    pub fn for_object(&self, object: &str) -> Option<&Arc<dyn PlatformPlugin>> {
        self.plugins.values().find(|p| p.handles_object(object))
    }

    /// Registered plugins, ordered by platform.
    pub fn all(&self) -> Vec<Arc<dyn PlatformPlugin>> {
        let mut all: Vec<_> = self.plugins.values().cloned().collect();
        all.sort_by_key(|p| p.platform());
        all
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PlatformSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.all().iter().map(|p| p.platform())).finish()
    }
}
