mod catalog;
mod chart;
mod commands;
mod config;
mod engine;
mod notify;
mod price;
mod rule;
mod scheduler;
mod slack;
mod store;
mod types;

use chart::ChartService;
use commands::CommandRouter;
use config::Config;
use engine::RuleEngine;
use notify::SlackNotifier;
use price::{CexPriceSource, PriceSource};
use scheduler::Scheduler;
use slack::{SlackClient, SocketModeListener};
use store::RuleStore;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Setup Logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting crypto alert bot...");

    // 2. Load Config
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {:#}", e);
            return Ok(());
        }
    };
    info!(
        "Config loaded. Check interval: {:?}, quote: {}",
        config.check_interval, config.quote_currency
    );

    // 3. Initialize Components
    let slack = Arc::new(SlackClient::new(
        &config.slack_api_url,
        &config.slack_bot_token,
        &config.slack_app_token,
    ));
    let store = Arc::new(RuleStore::new(&config.alerts_file));
    info!("Alert rules stored in {}", store.path().display());
    let prices: Arc<dyn PriceSource> = Arc::new(CexPriceSource::new(&config.price_api_url));
    let notifier = Arc::new(SlackNotifier::new(
        slack.clone(),
        &config.slack_channel_id,
        &config.quote_currency,
    ));
    let engine = Arc::new(RuleEngine::new(
        store.clone(),
        prices.clone(),
        notifier,
        &config.quote_currency,
    ));
    let router = Arc::new(CommandRouter::new(
        slack.clone(),
        store,
        prices,
        ChartService::new(&config.coingecko_api_url, &config.quickchart_url),
        &config.quote_currency,
    ));

    if let Err(e) = slack
        .post_message(&config.slack_channel_id, commands::startup_message())
        .await
    {
        warn!("Could not post startup message: {:#}", e);
    }

    // 4. Start Background Tasks
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(engine, config.check_interval);
    let scheduler_task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    let (event_tx, mut event_rx) = mpsc::channel(100);
    let listener = SocketModeListener::new(slack.clone(), event_tx);
    let listener_task = tokio::spawn(async move { listener.run().await });

    // 5. Handle mentions until Ctrl-C
    let mut handlers = JoinSet::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    warn!("Event mailbox closed");
                    break;
                };
                let router = router.clone();
                handlers.spawn(async move { router.handle(&event).await });
            }
            Some(joined) = handlers.join_next() => log_handler_result(joined),
            _ = &mut ctrl_c => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    // 6. Graceful shutdown: let the current pass and in-flight commands finish.
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_task.await {
        error!("Scheduler task failed: {}", e);
    }
    listener_task.abort();
    while let Some(joined) = handlers.join_next().await {
        log_handler_result(joined);
    }

    info!("Bye");
    Ok(())
}

fn log_handler_result(joined: Result<anyhow::Result<()>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Command failed: {:#}", e),
        Err(e) => error!("Command task panicked: {}", e),
    }
}
