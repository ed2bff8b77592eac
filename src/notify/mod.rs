// DANS : src/notify/mod.rs

//! Les collaborateurs externes appelés par le dispatcher.

pub mod telegram;
pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::communication::{CopyTradeOrder, SubscriberId};

pub use telegram::TelegramNotifier;
pub use webhook::WebhookTradeExecutor;

/// Le canal de notification des abonnés. L'implémentation gère son propre timeout.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subscriber: &SubscriberId, message: &str) -> Result<()>;
}

/// Le hook d'exécution automatique. Fire-and-forget du point de vue du moteur.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn execute(&self, order: &CopyTradeOrder) -> Result<()>;
}

/// Notifier "dry run" : se contente de loguer.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subscriber: &SubscriberId, message: &str) -> Result<()> {
        info!(subscriber = %subscriber, message = %message, "[DRY RUN] Notification simulée.");
        Ok(())
    }
}

pub struct LogTradeExecutor;

#[async_trait]
impl TradeExecutor for LogTradeExecutor {
    async fn execute(&self, order: &CopyTradeOrder) -> Result<()> {
        info!(
            subscriber = %order.subscriber,
            target = %order.target_wallet,
            signature = %order.signature,
            copy_amount_sol = order.copy_amount_sol,
            "[DRY RUN] Ordre de copy-trade simulé."
        );
        Ok(())
    }
}
