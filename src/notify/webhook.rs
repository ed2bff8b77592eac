// DANS : src/notify/webhook.rs

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::TradeExecutor;
use crate::communication::CopyTradeOrder;

/// Transmet les ordres de copy-trade au service d'exécution (signature, envoi, bundles).
/// Sa politique de retry ne nous concerne pas.
pub struct WebhookTradeExecutor {
    client: Client,
    url: String,
}

impl WebhookTradeExecutor {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Impossible de construire le client HTTP du webhook")?;
        Ok(Self { client, url: url.to_string() })
    }
}

#[async_trait]
impl TradeExecutor for WebhookTradeExecutor {
    async fn execute(&self, order: &CopyTradeOrder) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(order)
            .send()
            .await
            .with_context(|| format!("Webhook d'exécution injoignable pour {}", order.signature))?;
        if !response.status().is_success() {
            bail!("Webhook d'exécution : statut {}", response.status());
        }
        Ok(())
    }
}
