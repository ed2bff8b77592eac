// DANS : src/registry/memory.rs

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::InterestRegistry;
use crate::communication::{Interest, SubscriberId, Subscribers, SubscriptionParams};
use crate::error::RegistryError;

/// Registre en mémoire, même contrat que la version Redis.
/// L'ensemble surveillé n'est pas stocké : ce sont les clés dont la map d'abonnés est non vide.
#[derive(Default)]
pub struct MemoryInterestRegistry {
    owners: Mutex<HashMap<Pubkey, Subscribers>>,
    /// Simule une panne du backend (tests du chemin "registre indisponible").
    unavailable: AtomicBool,
}

impl MemoryInterestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn owners(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Pubkey, Subscribers>>, RegistryError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(RegistryError::Unavailable(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "registre en mémoire marqué indisponible",
            ))));
        }
        self.owners
            .lock()
            .map_err(|_| RegistryError::Corrupt("verrou empoisonné".to_string()))
    }
}

#[async_trait]
impl InterestRegistry for MemoryInterestRegistry {
    async fn full_resync(&self, interests: &[Interest]) -> Result<(), RegistryError> {
        let mut fresh: HashMap<Pubkey, Subscribers> = HashMap::new();
        for interest in interests {
            fresh
                .entry(interest.address)
                .or_default()
                .insert(interest.subscriber.clone(), interest.params);
        }
        *self.owners()? = fresh;
        Ok(())
    }

    async fn add_interest(
        &self,
        address: &Pubkey,
        subscriber: &SubscriberId,
        params: SubscriptionParams,
    ) -> Result<(), RegistryError> {
        self.owners()?.entry(*address).or_default().insert(subscriber.clone(), params);
        Ok(())
    }

    async fn remove_interest(&self, address: &Pubkey, subscriber: &SubscriberId) -> Result<(), RegistryError> {
        let mut owners = self.owners()?;
        if let Some(subscribers) = owners.get_mut(address) {
            subscribers.remove(subscriber);
            if subscribers.is_empty() {
                owners.remove(address);
            }
        }
        Ok(())
    }

    async fn is_monitored(&self, address: &Pubkey) -> Result<bool, RegistryError> {
        Ok(self.owners()?.contains_key(address))
    }

    async fn get_subscribers(&self, address: &Pubkey) -> Result<Subscribers, RegistryError> {
        Ok(self.owners()?.get(address).cloned().unwrap_or_default())
    }

    async fn monitored_count(&self) -> Result<u64, RegistryError> {
        Ok(self.owners()?.len() as u64)
    }
}
