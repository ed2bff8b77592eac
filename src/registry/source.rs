// DANS : src/registry/source.rs

//! La source de vérité des intérêts actifs (la base relationnelle, hors de ce crate).
//! Le moteur ne fait que la lire au démarrage et à chaque resync périodique.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::communication::{Interest, SubscriberId, SubscriptionParams};

#[async_trait]
pub trait InterestSource: Send + Sync {
    async fn list_active_interests(&self) -> Result<Vec<Interest>>;
}

/// Une ligne de l'export des cibles de copy-trade.
#[derive(Deserialize, Debug)]
struct InterestRecord {
    address: String,
    subscriber_id: String,
    copy_amount_sol: f64,
    #[serde(default)]
    auto_execute: bool,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Lit un export JSON (tableau de lignes) des cibles actives.
pub struct JsonFileInterestSource {
    path: PathBuf,
}

impl JsonFileInterestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<Vec<Interest>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Impossible d'ouvrir le fichier d'intérêts '{}'", self.path.display()))?;
        let records: Vec<InterestRecord> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Erreur de désérialisation du fichier d'intérêts '{}'", self.path.display()))?;

        let total = records.len();
        let mut interests = Vec::with_capacity(total);
        for record in records {
            if !record.is_active {
                continue;
            }
            let Ok(address) = Pubkey::from_str(record.address.trim()) else {
                warn!(address = %record.address, subscriber = %record.subscriber_id, "[Source] Adresse invalide, ligne ignorée.");
                continue;
            };
            if !record.copy_amount_sol.is_finite() || record.copy_amount_sol < 0.0 {
                warn!(address = %record.address, "[Source] Montant invalide, ligne ignorée.");
                continue;
            }
            interests.push(Interest {
                address,
                subscriber: SubscriberId(record.subscriber_id),
                params: SubscriptionParams {
                    copy_amount_sol: record.copy_amount_sol,
                    auto_execute: record.auto_execute,
                },
            });
        }
        info!(total, active = interests.len(), "[Source] Intérêts actifs chargés.");
        Ok(interests)
    }
}

#[async_trait]
impl InterestSource for JsonFileInterestSource {
    async fn list_active_interests(&self) -> Result<Vec<Interest>> {
        self.load()
    }
}

/// Source fixe, remplaçable à chaud. Pratique pour les tests et l'outillage.
#[derive(Default)]
pub struct StaticInterestSource {
    interests: Mutex<Vec<Interest>>,
}

impl StaticInterestSource {
    pub fn new(interests: Vec<Interest>) -> Self {
        Self { interests: Mutex::new(interests) }
    }

    pub fn replace(&self, interests: Vec<Interest>) {
        if let Ok(mut current) = self.interests.lock() {
            *current = interests;
        }
    }
}

#[async_trait]
impl InterestSource for StaticInterestSource {
    async fn list_active_interests(&self) -> Result<Vec<Interest>> {
        let interests = self
            .interests
            .lock()
            .map_err(|_| anyhow::anyhow!("verrou de la source empoisonné"))?;
        Ok(interests.clone())
    }
}
