// DANS : src/registry/mod.rs

//! Le registre des intérêts : "cette adresse est-elle surveillée ?" et "par qui ?".
//!
//! Invariant : une adresse est dans l'ensemble surveillé si et seulement si son hash
//! d'abonnés contient au moins une entrée. Toutes les implémentations le garantissent
//! atomiquement.

pub mod memory;
pub mod redis_store;
pub mod source;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::communication::{Interest, SubscriberId, Subscribers, SubscriptionParams};
use crate::error::RegistryError;

pub use memory::MemoryInterestRegistry;
pub use redis_store::RedisInterestRegistry;
pub use source::{InterestSource, JsonFileInterestSource, StaticInterestSource};

#[async_trait]
pub trait InterestRegistry: Send + Sync {
    /// Remplace TOUT l'état par la liste donnée (pas une fusion).
    async fn full_resync(&self, interests: &[Interest]) -> Result<(), RegistryError>;

    /// Dernière écriture gagnante si l'abonné surveillait déjà l'adresse.
    async fn add_interest(
        &self,
        address: &Pubkey,
        subscriber: &SubscriberId,
        params: SubscriptionParams,
    ) -> Result<(), RegistryError>;

    async fn remove_interest(&self, address: &Pubkey, subscriber: &SubscriberId) -> Result<(), RegistryError>;

    async fn is_monitored(&self, address: &Pubkey) -> Result<bool, RegistryError>;

    async fn get_subscribers(&self, address: &Pubkey) -> Result<Subscribers, RegistryError>;

    async fn monitored_count(&self) -> Result<u64, RegistryError>;
}

/// Encodage d'une valeur de hash : JSON `{"copy_amount_sol":..,"auto_execute":..}`.
pub fn encode_params(params: &SubscriptionParams) -> String {
    serde_json::to_string(params).unwrap_or_else(|_| params.copy_amount_sol.to_string())
}

/// Accepte aussi l'ancien format : un simple montant en SOL.
pub fn decode_params(raw: &str) -> Option<SubscriptionParams> {
    if let Ok(params) = serde_json::from_str::<SubscriptionParams>(raw) {
        return Some(params);
    }
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite())
        .map(SubscriptionParams::notify_only)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_round_trip_and_legacy_amounts() {
        let params = SubscriptionParams { copy_amount_sol: 0.25, auto_execute: true };
        assert_eq!(decode_params(&encode_params(&params)), Some(params));
        assert_eq!(decode_params("1.5"), Some(SubscriptionParams::notify_only(1.5)));
        assert_eq!(
            decode_params(r#"{"copy_amount_sol":2.0}"#),
            Some(SubscriptionParams::notify_only(2.0))
        );
        assert_eq!(decode_params("n'importe quoi"), None);
        assert_eq!(decode_params("NaN"), None);
    }
}
