// DANS : src/registry/redis_store.rs

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use tracing::{info, warn};

use super::{InterestRegistry, decode_params, encode_params};
use crate::communication::{
    Interest, MONITORED_SET_KEY, OWNER_HASH_PREFIX, SubscriberId, Subscribers, SubscriptionParams,
    owner_hash_key,
};
use crate::error::RegistryError;

// KEYS[1] = ensemble surveillé, KEYS[2] = hash de l'adresse ; ARGV[1] = adresse, ARGV[2] = abonné.
const REMOVE_SCRIPT: &str = r#"
redis.call('HDEL', KEYS[2], ARGV[2])
if redis.call('HLEN', KEYS[2]) == 0 then
    redis.call('SREM', KEYS[1], ARGV[1])
    return 1
end
return 0
"#;

// KEYS[1] = ensemble surveillé ; ARGV[1] = préfixe des hash, puis triplets (adresse, abonné, params).
const RESYNC_SCRIPT: &str = r#"
local members = redis.call('SMEMBERS', KEYS[1])
for _, member in ipairs(members) do
    redis.call('DEL', ARGV[1] .. member)
end
redis.call('DEL', KEYS[1])
for i = 2, #ARGV, 3 do
    redis.call('SADD', KEYS[1], ARGV[i])
    redis.call('HSET', ARGV[1] .. ARGV[i], ARGV[i + 1], ARGV[i + 2])
end
return redis.call('SCARD', KEYS[1])
"#;

/// Registre partagé dans Redis : `monitored_wallets` (SET) + `wallet_owner:<adresse>` (HASH).
///
/// Toutes les écritures sont atomiques côté serveur (MULTI/EXEC ou script Lua), donc un
/// resync concurrent d'un ajout ne peut pas désynchroniser l'ensemble et les hash.
#[derive(Clone)]
pub struct RedisInterestRegistry {
    conn: MultiplexedConnection,
    remove_script: Script,
    resync_script: Script,
}

impl RedisInterestRegistry {
    pub async fn connect(redis_url: &str) -> Result<Self, RegistryError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("[Registry] Connecté à Redis.");
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            remove_script: Script::new(REMOVE_SCRIPT),
            resync_script: Script::new(RESYNC_SCRIPT),
        }
    }

    /// Toutes les adresses surveillées (utilisé par l'outil d'administration).
    pub async fn monitored_addresses(&self) -> Result<Vec<String>, RegistryError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(MONITORED_SET_KEY).await?;
        Ok(members)
    }
}

#[async_trait]
impl InterestRegistry for RedisInterestRegistry {
    async fn full_resync(&self, interests: &[Interest]) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.resync_script.prepare_invoke();
        invocation.key(MONITORED_SET_KEY).arg(OWNER_HASH_PREFIX);
        for interest in interests {
            invocation
                .arg(interest.address.to_string())
                .arg(interest.subscriber.0.as_str())
                .arg(encode_params(&interest.params));
        }
        let count: u64 = invocation.invoke_async(&mut conn).await?;
        info!(interests = interests.len(), monitored = count, "[Registry] Resync complet appliqué.");
        Ok(())
    }

    async fn add_interest(
        &self,
        address: &Pubkey,
        subscriber: &SubscriberId,
        params: SubscriptionParams,
    ) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        let member = address.to_string();
        redis::pipe()
            .atomic()
            .sadd(MONITORED_SET_KEY, &member)
            .ignore()
            .hset(owner_hash_key(address), subscriber.0.as_str(), encode_params(&params))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove_interest(&self, address: &Pubkey, subscriber: &SubscriberId) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        let emptied: i64 = self
            .remove_script
            .key(MONITORED_SET_KEY)
            .key(owner_hash_key(address))
            .arg(address.to_string())
            .arg(subscriber.0.as_str())
            .invoke_async(&mut conn)
            .await?;
        if emptied == 1 {
            info!(wallet = %address, "[Registry] Plus aucun abonné : adresse retirée de la surveillance.");
        }
        Ok(())
    }

    async fn is_monitored(&self, address: &Pubkey) -> Result<bool, RegistryError> {
        let mut conn = self.conn.clone();
        Ok(conn.sismember(MONITORED_SET_KEY, address.to_string()).await?)
    }

    async fn get_subscribers(&self, address: &Pubkey) -> Result<Subscribers, RegistryError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(owner_hash_key(address)).await?;
        let mut subscribers = Subscribers::with_capacity(raw.len());
        for (subscriber, value) in raw {
            match decode_params(&value) {
                Some(params) => {
                    subscribers.insert(SubscriberId(subscriber), params);
                }
                None => warn!(wallet = %address, subscriber = %subscriber, "[Registry] Paramètres illisibles, entrée ignorée."),
            }
        }
        Ok(subscribers)
    }

    async fn monitored_count(&self) -> Result<u64, RegistryError> {
        let mut conn = self.conn.clone();
        Ok(conn.scard(MONITORED_SET_KEY).await?)
    }
}
