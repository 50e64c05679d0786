#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};

use {
    async_trait::async_trait,
    mockito::Matcher,
    secrecy::Secret,
    switchboard_channels::{
        Account, ConversationEngine, ConversationHandle, Error, MessageContent, NormalizedMessage,
        PhoneNumber, PlatformPlugin,
    },
    switchboard_common::Network,
    switchboard_config::WhatsAppConfig,
    switchboard_graph::{GraphClient, GraphEndpoint, event::Event},
    switchboard_oauth::{Credential, GrantedScope, SigningProofCache},
    switchboard_whatsapp::WhatsAppPlugin,
};

#[derive(Default)]
struct Recorder {
    delivered: Mutex<Vec<(Network, String, String, NormalizedMessage)>>,
}

#[async_trait]
impl ConversationEngine for Recorder {
    async fn deliver(
        &self,
        network: Network,
        account_id: &str,
        sender_id: &str,
        message: NormalizedMessage,
    ) -> anyhow::Result<ConversationHandle> {
        let mut delivered = self.delivered.lock().unwrap();
        delivered.push((network, account_id.into(), sender_id.into(), message));
        Ok(ConversationHandle {
            id: format!("conv-{}", delivered.len()),
        })
    }
}

fn plugin(server: &mockito::Server, config: WhatsAppConfig) -> (WhatsAppPlugin, Arc<Recorder>) {
    let graph = GraphClient::new(
        GraphEndpoint::new(server.url(), "v12.0"),
        Arc::new(SigningProofCache::new(Secret::new("app-secret".into()))),
    );
    let engine = Arc::new(Recorder::default());
    (WhatsAppPlugin::new(graph, "42", config, engine.clone()), engine)
}

fn nodes_body() -> String {
    serde_json::json!({
        "102290129340398": {
            "id": "102290129340398",
            "name": "Acme Support",
            "phone_numbers": {"data": [
                {"id": "106540352242922", "display_phone_number": "+1 555-0100", "verified_name": "Acme"}
            ]},
            "subscribed_apps": {"data": [{"whatsapp_business_api_data": {"id": "42"}}]}
        },
        "200": {"id": "200", "name": "Acme Sales"}
    })
    .to_string()
}

#[tokio::test]
async fn discovers_shared_business_accounts() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v12.0")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("ids".into(), "102290129340398,200".into()),
            Matcher::UrlEncoded("access_token".into(), "user-token".into()),
        ]))
        .with_body(nodes_body())
        .create_async()
        .await;

    let (plugin, _) = plugin(&server, WhatsAppConfig::default());
    let mut credential = Credential::new("user-token");
    credential.scopes = vec![
        GrantedScope {
            scope: "whatsapp_business_management".into(),
            target_ids: vec!["102290129340398".into(), "200".into()],
        },
        GrantedScope {
            scope: "whatsapp_business_messaging".into(),
            target_ids: vec!["102290129340398".into()],
        },
    ];

    let accounts = plugin.discover(&credential, None).await.unwrap();
    mock.assert_async().await;

    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0].id, "102290129340398");
    assert_eq!(accounts[0].subscribed_fields, vec!["messages"]);
    assert_eq!(accounts[0].phone_numbers()[0].id, "106540352242922");
    assert!(accounts[0].credential.is_some());
    assert_eq!(accounts[1].name, "Acme Sales");
    assert!(!accounts[1].is_subscribed());
    // Discovery does not touch the registry.
    assert!(plugin.registry().is_empty());
}

#[tokio::test]
async fn token_without_shared_accounts_discovers_nothing() {
    let server = mockito::Server::new_async().await;
    let (plugin, _) = plugin(&server, WhatsAppConfig::default());
    let accounts = plugin
        .discover(&Credential::new("user-token"), None)
        .await
        .unwrap();
    assert!(accounts.is_empty());
}

#[tokio::test]
async fn revalidation_needs_a_system_token() {
    let server = mockito::Server::new_async().await;
    let (plugin, _) = plugin(&server, WhatsAppConfig::default());
    assert!(matches!(
        plugin.revalidate(None).await,
        Err(Error::Unavailable { .. })
    ));
}

#[tokio::test]
async fn revalidation_restores_credentials_and_phone_numbers() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v12.0")
        .match_query(Matcher::UrlEncoded("access_token".into(), "system".into()))
        .with_body(nodes_body())
        .create_async()
        .await;

    let config = WhatsAppConfig {
        system_token: Some(Secret::new("system".into())),
        ..Default::default()
    };
    let (plugin, _) = plugin(&server, config);
    let mut restored = Account::business("102290129340398", "Acme Support");
    restored.authorized_by = Some("4705278912843591".into());
    plugin.registry().merge(restored, false);
    plugin.registry().merge(Account::business("200", "Acme Sales"), false);

    assert_eq!(plugin.revalidate(None).await.unwrap(), 2);
    let account = plugin.registry().get("102290129340398").unwrap();
    assert!(account.credential.is_some());
    assert!(account.is_subscribed());
    assert_eq!(account.authorized_by.as_deref(), Some("4705278912843591"));
    assert_eq!(
        plugin.registry().lookup("106540352242922").unwrap().id,
        "102290129340398"
    );
}

#[tokio::test]
async fn messages_are_routed_by_phone_number() {
    let server = mockito::Server::new_async().await;
    let (plugin, engine) = plugin(&server, WhatsAppConfig::default());
    plugin.registry().merge(
        Account::business("102290129340398", "Acme Support").with_phone(PhoneNumber {
            id: "106540352242922".into(),
            display_phone_number: "+1 555-0100".into(),
            verified_name: "Acme".into(),
        }),
        false,
    );

    let event: Event = serde_json::from_value(serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "102290129340398",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {"display_phone_number": "15550100", "phone_number_id": "106540352242922"},
                    "contacts": [{"profile": {"name": "Kim"}, "wa_id": "16315551234"}],
                    "messages": [{
                        "from": "16315551234", "id": "wamid.1", "timestamp": "1700000000",
                        "type": "text", "text": {"body": "hi"}
                    }],
                    "statuses": [{"id": "wamid.0", "status": "read", "recipient_id": "16315551234"}]
                }
            }, {
                "field": "messages",
                "value": {
                    "metadata": {"phone_number_id": "999"},
                    "messages": [{"from": "1", "id": "wamid.2", "timestamp": "1", "type": "text", "text": {"body": "lost"}}]
                }
            }, {
                "field": "account_update",
                "value": {}
            }]
        }]
    }))
    .unwrap();

    assert_eq!(plugin.handle_event(&event).await.unwrap(), 1);
    let delivered = engine.delivered.lock().unwrap();
    let (network, account_id, sender_id, message) = &delivered[0];
    assert_eq!(*network, Network::WhatsApp);
    assert_eq!(account_id, "102290129340398");
    assert_eq!(sender_id, "16315551234");
    assert_eq!(message.recipient_id, "106540352242922");
    assert_eq!(message.sender_name.as_deref(), Some("Kim"));
    assert_eq!(message.content, MessageContent::Text { text: "hi".into() });
}

#[tokio::test]
async fn unsubscribe_clears_subscription_state() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v12.0")
        .match_body(Matcher::Regex("DELETE".into()))
        .with_body(
            serde_json::json!([{"code": 200, "body": "{\"success\":true}"}]).to_string(),
        )
        .create_async()
        .await;

    let (plugin, _) = plugin(&server, WhatsAppConfig::default());
    let mut account =
        Account::business("102290129340398", "Acme").with_credential(Credential::new("tok"));
    account.subscribed_fields = vec!["messages".into()];
    plugin.registry().merge(account.clone(), false);

    let report = plugin.unsubscribe(vec![account], None).await.unwrap();
    assert!(report.is_complete());
    assert!(!plugin.registry().get("102290129340398").unwrap().is_subscribed());
}
