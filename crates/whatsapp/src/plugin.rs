use std::sync::Arc;

use {
    async_trait::async_trait,
    secrecy::Secret,
    switchboard_channels::{
        Account, AccountRegistry, ConversationEngine, Error, PlatformPlugin, Result,
        SubscriptionReport,
        subscription::{self, Direction},
    },
    switchboard_common::Platform,
    switchboard_config::WhatsAppConfig,
    switchboard_graph::{
        BatchOperation, Deadline, GraphClient,
        event::{Event, OBJECT_WHATSAPP},
    },
    switchboard_oauth::Credential,
    tracing::info,
};

use crate::{discovery, webhook};

/// Business-phone messaging platform plugin.
pub struct WhatsAppPlugin {
    registry: AccountRegistry,
    graph: GraphClient,
    app_id: String,
    config: WhatsAppConfig,
    engine: Arc<dyn ConversationEngine>,
}

impl WhatsAppPlugin {
    pub fn new(
        graph: GraphClient,
        app_id: impl Into<String>,
        config: WhatsAppConfig,
        engine: Arc<dyn ConversationEngine>,
    ) -> Self {
        Self {
            registry: AccountRegistry::new(Platform::WhatsApp),
            graph,
            app_id: app_id.into(),
            config,
            engine,
        }
    }

    fn system_token(&self) -> Option<&Secret<String>> {
        self.config.system_token.as_ref()
    }
}

fn subscribe_op(account: &Account) -> BatchOperation {
    authorize(BatchOperation::post(format!("{}/subscribed_apps", account.id)), account)
}

fn unsubscribe_op(account: &Account) -> BatchOperation {
    authorize(BatchOperation::delete(format!("{}/subscribed_apps", account.id)), account)
}

fn authorize(op: BatchOperation, account: &Account) -> BatchOperation {
    match &account.credential {
        Some(credential) => op.authorized(credential.token().clone()),
        None => op,
    }
}

#[async_trait]
impl PlatformPlugin for WhatsAppPlugin {
    fn platform(&self) -> Platform {
        Platform::WhatsApp
    }

    fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    fn scopes(&self) -> &[String] {
        &self.config.scopes
    }

    fn subscribed_fields(&self) -> &[String] {
        &self.config.subscribed_fields
    }

    fn handles_object(&self, object: &str) -> bool {
        object == OBJECT_WHATSAPP
    }

    async fn discover(&self, credential: &Credential, deadline: Deadline) -> Result<Vec<Account>> {
        let ids = discovery::shared_account_ids(credential);
        if ids.is_empty() {
            info!("token shares no business accounts");
            return Ok(Vec::new());
        }
        let accounts = discovery::fetch_accounts(
            &self.graph,
            &ids,
            credential.token(),
            &self.app_id,
            &self.config.subscribed_fields,
            deadline,
        )
        .await?;
        info!(count = accounts.len(), "business accounts discovered");
        Ok(accounts
            .into_iter()
            .map(|account| account.with_credential(credential.clone()))
            .collect())
    }

    async fn subscribe(
        &self,
        accounts: Vec<Account>,
        deadline: Deadline,
    ) -> Result<SubscriptionReport> {
        subscription::apply(
            &self.graph,
            &self.registry,
            accounts,
            Direction::Subscribe,
            &self.config.subscribed_fields,
            subscribe_op,
            deadline,
        )
        .await
    }

    async fn unsubscribe(
        &self,
        accounts: Vec<Account>,
        deadline: Deadline,
    ) -> Result<SubscriptionReport> {
        subscription::apply(
            &self.graph,
            &self.registry,
            accounts,
            Direction::Unsubscribe,
            &[],
            unsubscribe_op,
            deadline,
        )
        .await
    }

    async fn revalidate(&self, deadline: Deadline) -> Result<usize> {
        let Some(token) = self.system_token() else {
            return Err(Error::unavailable("no whatsapp system_token configured"));
        };
        let ids: Vec<String> = self.registry.get_many(&[]).into_iter().map(|a| a.id).collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let credential = Credential {
            access_token: token.clone(),
            expires_at: None,
            scopes: Vec::new(),
        };
        let accounts = discovery::fetch_accounts(
            &self.graph,
            &ids,
            token,
            &self.app_id,
            &self.config.subscribed_fields,
            deadline,
        )
        .await?;
        let refreshed = accounts.len();
        self.registry.merge_all(
            accounts
                .into_iter()
                .map(|account| account.with_credential(credential.clone()))
                .collect(),
            true,
        );
        info!(refreshed, registered = ids.len(), "business accounts revalidated");
        Ok(refreshed)
    }

    async fn handle_event(&self, event: &Event) -> Result<usize> {
        webhook::dispatch(&self.registry, self.engine.as_ref(), event).await
    }
}
