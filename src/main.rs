use anyhow::Context;
use events::EventPublisher;
use gateway::LogNavigator;
use log::*;
use permit_client::{Client, LogEventHandler};
use secrecy::SecretString;
use service::{config::Config, logging::Logger};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::new();
    Logger::init_logger(&config)?;

    info!(
        "Starting permit client [{}] against {}",
        config.runtime_env(),
        config.base_url
    );

    let publisher = EventPublisher::new().with_handler(Arc::new(LogEventHandler));
    let client = Client::new(&config, Arc::new(LogNavigator), publisher)?;

    match config.credentials() {
        Some((username, password)) => client
            .login(&username, &SecretString::new(password))
            .await
            .with_context(|| format!("signing in as {username}"))?,
        None => warn!("No credentials configured, staying signed out"),
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutting down");
    client.logout().await;
    client.teardown().await;
    Ok(())
}
