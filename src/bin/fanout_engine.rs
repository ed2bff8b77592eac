#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use fanout::{
    config::Config,
    engine::FanOutEngine,
    monitoring::metrics,
    notify::{LogNotifier, LogTradeExecutor, Notifier, TelegramNotifier, TradeExecutor, WebhookTradeExecutor},
    registry::{InterestRegistry, InterestSource, JsonFileInterestSource, RedisInterestRegistry},
};

#[tokio::main]
async fn main() -> Result<()> {
    fanout::monitoring::logging::setup_logging();
    info!("--- Démarrage du moteur de fan-out copy-trade ---");

    let config = Config::load()?;
    let notify_timeout = Duration::from_millis(config.notify_timeout_ms);

    tokio::spawn(metrics::start_metrics_server(config.metrics_port));

    let registry: Arc<dyn InterestRegistry> = Arc::new(RedisInterestRegistry::connect(&config.redis_url).await?);
    let source: Arc<dyn InterestSource> = Arc::new(JsonFileInterestSource::new(&config.interests_file));

    // Sans token Telegram ni webhook, on tourne en "dry run" : tout est logué.
    let notifier: Arc<dyn Notifier> = match &config.telegram_bot_token {
        Some(token) => Arc::new(TelegramNotifier::new(&config.telegram_api_url, token, notify_timeout)?),
        None => {
            info!("[Main] TELEGRAM_BOT_TOKEN absent, notifications en mode DRY RUN.");
            Arc::new(LogNotifier)
        }
    };
    let executor: Arc<dyn TradeExecutor> = match &config.trade_webhook_url {
        Some(url) => Arc::new(WebhookTradeExecutor::new(url, notify_timeout)?),
        None => {
            info!("[Main] TRADE_WEBHOOK_URL absent, ordres en mode DRY RUN.");
            Arc::new(LogTradeExecutor)
        }
    };

    let engine = FanOutEngine::from_config(&config, registry, source, notifier, Some(executor))?;
    if let Err(e) = engine.start().await {
        error!(error = ?e, "[Main] Démarrage impossible.");
        engine.shutdown().await;
        return Err(e);
    }

    tokio::signal::ctrl_c().await?;
    info!("[Main] Signal d'arrêt reçu.");
    engine.shutdown().await;
    info!("--- Moteur arrêté proprement ---");
    Ok(())
}
