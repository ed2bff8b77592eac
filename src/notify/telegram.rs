// DANS : src/notify/telegram.rs

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use super::Notifier;
use crate::communication::SubscriberId;

/// Envoi via l'API Bot Telegram (`sendMessage`). L'id d'abonné est le chat id.
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
}

impl TelegramNotifier {
    pub fn new(api_url: &str, bot_token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Impossible de construire le client HTTP Telegram")?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{}/sendMessage", api_url.trim_end_matches('/'), bot_token),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, subscriber: &SubscriberId, message: &str) -> Result<()> {
        let body = json!({
            "chat_id": subscriber.0,
            "text": message,
            "disable_web_page_preview": true,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .context("Requête Telegram en échec")?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("Telegram a répondu {status} : {detail}");
        }
        Ok(())
    }
}
