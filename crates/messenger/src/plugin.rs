use std::sync::Arc;

use {
    async_trait::async_trait,
    switchboard_channels::{
        Account, AccountRegistry, ConversationEngine, Error, PlatformPlugin, Result,
        SubscriptionReport,
        subscription::{self, Direction},
    },
    switchboard_common::Platform,
    switchboard_config::MessengerConfig,
    switchboard_graph::{
        BatchOperation, Deadline, GraphClient,
        event::{Event, OBJECT_INSTAGRAM, OBJECT_PAGE},
    },
    switchboard_oauth::Credential,
    tracing::info,
};

use crate::{discovery, webhook};

/// Page messenger platform plugin.
pub struct MessengerPlugin {
    registry: AccountRegistry,
    graph: GraphClient,
    app_id: String,
    config: MessengerConfig,
    engine: Arc<dyn ConversationEngine>,
}

impl MessengerPlugin {
    pub fn new(
        graph: GraphClient,
        app_id: impl Into<String>,
        config: MessengerConfig,
        engine: Arc<dyn ConversationEngine>,
    ) -> Self {
        Self {
            registry: AccountRegistry::new(Platform::Messenger),
            graph,
            app_id: app_id.into(),
            config,
            engine,
        }
    }

    fn subscribe_op(&self, page: &Account) -> BatchOperation {
        authorize(
            BatchOperation::post(format!("{}/subscribed_apps", page.id))
                .param("subscribed_fields", self.config.subscribed_fields.join(",")),
            page,
        )
    }
}

fn unsubscribe_op(page: &Account) -> BatchOperation {
    authorize(BatchOperation::delete(format!("{}/subscribed_apps", page.id)), page)
}

fn authorize(op: BatchOperation, page: &Account) -> BatchOperation {
    match &page.credential {
        Some(credential) => op.authorized(credential.token().clone()),
        None => op,
    }
}

#[async_trait]
impl PlatformPlugin for MessengerPlugin {
    fn platform(&self) -> Platform {
        Platform::Messenger
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
        object == OBJECT_PAGE || object == OBJECT_INSTAGRAM
    }

    async fn discover(&self, credential: &Credential, deadline: Deadline) -> Result<Vec<Account>> {
        let mut pages = discovery::list_pages(&self.graph, credential, deadline).await?;
        discovery::load_subscriptions(&self.graph, &mut pages, &self.app_id, deadline).await?;
        info!(count = pages.len(), "pages discovered");
        Ok(pages)
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
            |page| self.subscribe_op(page),
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
        let Some(token) = self.config.system_token.as_ref() else {
            return Err(Error::unavailable("no messenger system_token configured"));
        };
        let ids: Vec<String> = self.registry.get_many(&[]).into_iter().map(|a| a.id).collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let mut pages = discovery::fetch_pages(&self.graph, &ids, token, deadline).await?;
        discovery::load_subscriptions(&self.graph, &mut pages, &self.app_id, deadline).await?;
        let refreshed = pages.len();
        self.registry.merge_all(pages, true);
        info!(refreshed, registered = ids.len(), "pages revalidated");
        Ok(refreshed)
    }

    async fn handle_event(&self, event: &Event) -> Result<usize> {
        webhook::dispatch(&self.registry, self.engine.as_ref(), event).await
    }
}
