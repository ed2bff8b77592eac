// DANS : src/communication.rs

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// --- CONSTANTES CENTRALISÉES ---
pub const MONITORED_SET_KEY: &str = "monitored_wallets";
pub const OWNER_HASH_PREFIX: &str = "wallet_owner:";

pub fn owner_hash_key(address: &Pubkey) -> String {
    format!("{OWNER_HASH_PREFIX}{address}")
}

/// Identifiant opaque d'un abonné (ex: l'id Telegram de l'utilisateur).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SubscriberId(pub String);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Paramètres d'un abonnement. Le budget à copier, et si l'abonné veut une exécution automatique.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SubscriptionParams {
    pub copy_amount_sol: f64,
    #[serde(default)]
    pub auto_execute: bool,
}

impl SubscriptionParams {
    pub fn notify_only(copy_amount_sol: f64) -> Self {
        Self { copy_amount_sol, auto_execute: false }
    }
}

/// Une ligne "adresse surveillée par un abonné", telle que fournie par la source de vérité.
#[derive(Debug, Clone, PartialEq)]
pub struct Interest {
    pub address: Pubkey,
    pub subscriber: SubscriberId,
    pub params: SubscriptionParams,
}

pub type Subscribers = HashMap<SubscriberId, SubscriptionParams>;

/// Message brut reçu du stream, étiqueté par le programme de l'abonnement qui l'a livré.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub program: Arc<str>,
    pub payload: String,
}

/// Ordre de copy-trade transmis au hook d'exécution (fire-and-forget).
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CopyTradeOrder {
    pub subscriber: SubscriberId,
    pub target_wallet: String,
    pub signature: String,
    pub program_id: String,
    pub input_mint: String,
    pub output_mint: String,
    pub copy_amount_sol: f64,
    pub approximate: bool,
}

/// Une unité à livrer : un abonné, son message rendu, et éventuellement un ordre d'exécution.
#[derive(Debug, Clone)]
pub struct DispatchUnit {
    pub subscriber: SubscriberId,
    pub message: String,
    pub order: Option<CopyTradeOrder>,
}
