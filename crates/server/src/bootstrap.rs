use std::sync::Arc;
use std::time::Duration;

use axonbot_core::config::{AppConfig, ConfigError, LoadOptions};
use axonbot_core::{BotSession, FieldInitError, InventoryClient, InventoryError, ResultCache};
use axonbot_inventory::HttpInventoryClient;
use axonbot_slack::{
    ChatError, CommandRouter, EventDispatcher, InventoryCommandService, MessageHandler,
    ReconnectPolicy, SlackSocketTransport, SlackWebClient, SocketModeRunner,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub session: Arc<BotSession>,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("inventory client could not be created: {0}")]
    InventoryClient(#[source] InventoryError),
    #[error("default fields could not be initialized: {0}")]
    Fields(#[from] FieldInitError),
    #[error("slack web client failed: {0}")]
    Slack(#[source] ChatError),
    #[error("command table failed to compile: {0}")]
    CommandTable(#[from] regex::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        "starting application bootstrap"
    );

    let client: Arc<dyn InventoryClient> = Arc::new(
        HttpInventoryClient::new(&config.inventory).map_err(BootstrapError::InventoryClient)?,
    );
    let cache =
        ResultCache::new(Duration::from_secs(config.cache.ttl_secs), config.cache.max_entries);
    let session = Arc::new(
        BotSession::initialize(
            client,
            &config.inventory.device_fields,
            &config.inventory.user_fields,
            cache,
        )
        .await?,
    );
    info!(
        event_name = "system.bootstrap.fields_resolved",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        inventory_url = %config.inventory.url,
        "default field selections resolved against inventory"
    );

    let web = Arc::new(
        SlackWebClient::new(config.slack.bot_token.clone(), config.slack.https_proxy.as_deref())
            .map_err(BootstrapError::Slack)?,
    );
    let bot_user_id = web.auth_test().await.map_err(BootstrapError::Slack)?;
    info!(
        event_name = "system.bootstrap.slack_authenticated",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        bot_user_id = %bot_user_id,
        "slack bot identity confirmed"
    );

    let router = CommandRouter::new(InventoryCommandService::new(session.clone()))?;
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(router, web.clone(), bot_user_id));

    let transport = Arc::new(
        SlackSocketTransport::new(web, config.slack.app_token.clone())
            .with_proxy(config.slack.https_proxy.as_deref()),
    );
    let slack_runner =
        SocketModeRunner::new(transport, Arc::new(dispatcher), ReconnectPolicy::default());

    Ok(Application { config, session, slack_runner })
}
