// DANS : src/config.rs

use anyhow::{Result, bail};
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;

use crate::ingestion::protocol::SubscribeMethod;

/// Toute la configuration vient de l'environnement (et d'un éventuel `.env`).
/// Les listes (`STREAM_PROGRAM_IDS`, ...) sont séparées par des virgules.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    // --- Stream ---
    pub stream_ws_url: String,
    #[serde(default = "default_subscribe_method")]
    pub stream_subscribe_method: String,
    #[serde(default = "default_commitment")]
    pub stream_commitment: String,
    #[serde(default = "default_program_ids")]
    pub stream_program_ids: Vec<String>,
    #[serde(default = "default_subscription_buffer")]
    pub stream_subscription_buffer: usize,
    #[serde(default = "default_reconnect_delay_ms")]
    pub stream_reconnect_delay_ms: u64,
    #[serde(default = "default_ping_interval_ms")]
    pub stream_ping_interval_ms: u64,
    #[serde(default = "default_connect_per_sec")]
    pub stream_connect_per_sec: u32,
    #[serde(default = "default_requests_per_sec")]
    pub stream_requests_per_sec: u32,
    #[serde(default = "default_limiter_timeout_ms")]
    pub stream_limiter_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub stream_connect_timeout_ms: u64,

    // --- Registre ---
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
    #[serde(default = "default_interests_file")]
    pub interests_file: String,

    // --- Pipeline ---
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_log_buffer_size")]
    pub log_buffer_size: usize,
    #[serde(default = "default_notification_buffer_size")]
    pub notification_buffer_size: usize,
    #[serde(default = "default_notification_rate_limit")]
    pub notification_rate_limit: u32,
    #[serde(default = "default_trade_hook_concurrency")]
    pub trade_hook_concurrency: usize,
    #[serde(default)]
    pub extra_swap_program_ids: Vec<String>,

    // --- Collaborateurs ---
    pub telegram_bot_token: Option<String>,
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,
    pub trade_webhook_url: Option<String>,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_subscribe_method() -> String { "transactionSubscribe".to_string() }
fn default_commitment() -> String { "processed".to_string() }
fn default_program_ids() -> Vec<String> {
    vec![
        "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8".to_string(), // Raydium AMM v4
        "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK".to_string(), // Raydium CLMM
        "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4".to_string(), // Jupiter v6
        "pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA".to_string(), // Pump.fun AMM
    ]
}
fn default_subscription_buffer() -> usize { 50_000 }
fn default_reconnect_delay_ms() -> u64 { 5_000 }
fn default_ping_interval_ms() -> u64 { 30_000 }
fn default_connect_per_sec() -> u32 { 1 }
fn default_requests_per_sec() -> u32 { 20 }
fn default_limiter_timeout_ms() -> u64 { 10_000 }
fn default_connect_timeout_ms() -> u64 { 10_000 }
fn default_redis_url() -> String { "redis://127.0.0.1:6379/0".to_string() }
fn default_resync_interval_secs() -> u64 { 300 }
fn default_interests_file() -> String { "interests.json".to_string() }
fn default_worker_count() -> usize { 20 }
fn default_log_buffer_size() -> usize { 50_000 }
fn default_notification_buffer_size() -> usize { 10_000 }
fn default_notification_rate_limit() -> u32 { 25 }
fn default_trade_hook_concurrency() -> usize { 32 }
fn default_telegram_api_url() -> String { "https://api.telegram.org".to_string() }
fn default_notify_timeout_ms() -> u64 { 5_000 }
fn default_metrics_port() -> u16 { 9100 }

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Vérifications sémantiques que serde ne peut pas faire seul.
    pub fn validate(&self) -> Result<()> {
        if !self.stream_ws_url.starts_with("ws://") && !self.stream_ws_url.starts_with("wss://") {
            bail!("STREAM_WS_URL doit commencer par ws:// ou wss:// (reçu : {})", self.stream_ws_url);
        }
        self.subscribe_method()?;
        self.program_ids()?;
        self.extra_swap_programs()?;
        if self.worker_count == 0 {
            bail!("WORKER_COUNT doit être > 0");
        }
        if self.log_buffer_size == 0 || self.notification_buffer_size == 0 || self.stream_subscription_buffer == 0 {
            bail!("Les tailles de files doivent être > 0");
        }
        if self.notification_rate_limit == 0 || self.stream_connect_per_sec == 0 || self.stream_requests_per_sec == 0 {
            bail!("Les quotas des limiteurs doivent être > 0");
        }
        if self.trade_hook_concurrency == 0 {
            bail!("TRADE_HOOK_CONCURRENCY doit être > 0");
        }
        Ok(())
    }

    pub fn subscribe_method(&self) -> Result<SubscribeMethod> {
        SubscribeMethod::from_str(&self.stream_subscribe_method)
    }

    pub fn program_ids(&self) -> Result<Vec<Pubkey>> {
        parse_pubkeys(&self.stream_program_ids, "STREAM_PROGRAM_IDS")
    }

    pub fn extra_swap_programs(&self) -> Result<Vec<Pubkey>> {
        parse_pubkeys(&self.extra_swap_program_ids, "EXTRA_SWAP_PROGRAM_IDS")
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }
}

fn parse_pubkeys(values: &[String], key: &str) -> Result<Vec<Pubkey>> {
    values
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| Pubkey::from_str(s).map_err(|e| anyhow::anyhow!("{key} : adresse invalide '{s}' ({e})")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_from(vars: &[(&str, &str)]) -> Result<Config> {
        let config = envy::from_iter::<_, Config>(
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())),
        )?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn defaults_match_production_sizing() {
        let config = load_from(&[("STREAM_WS_URL", "wss://stream.example/ws")]).expect("config");
        assert_eq!(config.worker_count, 20);
        assert_eq!(config.log_buffer_size, 50_000);
        assert_eq!(config.notification_buffer_size, 10_000);
        assert_eq!(config.notification_rate_limit, 25);
        assert_eq!(config.stream_reconnect_delay_ms, 5_000);
        assert_eq!(config.stream_ping_interval_ms, 30_000);
        assert_eq!(config.program_ids().expect("programmes").len(), 4);
        assert_eq!(config.subscribe_method().expect("méthode"), SubscribeMethod::Transaction);
        assert!(config.telegram_bot_token.is_none());
    }

    #[test]
    fn comma_separated_lists_are_parsed() {
        let config = load_from(&[
            ("STREAM_WS_URL", "ws://127.0.0.1:8900"),
            ("STREAM_SUBSCRIBE_METHOD", "logsSubscribe"),
            (
                "STREAM_PROGRAM_IDS",
                "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4,675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8",
            ),
        ])
        .expect("config");
        assert_eq!(config.program_ids().expect("programmes").len(), 2);
        assert_eq!(config.subscribe_method().expect("méthode"), SubscribeMethod::Logs);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(load_from(&[("STREAM_WS_URL", "https://not-a-ws")]).is_err());
        assert!(load_from(&[("STREAM_WS_URL", "ws://ok"), ("WORKER_COUNT", "0")]).is_err());
        assert!(load_from(&[("STREAM_WS_URL", "ws://ok"), ("STREAM_PROGRAM_IDS", "pas-une-adresse")]).is_err());
        assert!(load_from(&[("STREAM_WS_URL", "ws://ok"), ("STREAM_SUBSCRIBE_METHOD", "blockSubscribe")]).is_err());
        assert!(load_from(&[]).is_err());
    }
}
