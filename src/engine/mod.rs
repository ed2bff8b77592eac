// DANS : src/engine/mod.rs

//! Le moteur de fan-out : stream -> file brute -> workers (matching) -> file de notifications -> dispatcher.
//!
//! Chaque étage est découplé par une file bornée. Quand une file est pleine, le message
//! est abandonné et compté ; aucun étage ne bloque celui qui l'alimente.

pub mod dispatcher;
pub mod matcher;

use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::communication::{DispatchUnit, RawEvent, SubscriberId, SubscriptionParams};
use crate::config::Config;
use crate::error::{IngestionError, RegistryError};
use crate::ingestion::{StreamClient, StreamClientConfig};
use crate::monitoring::metrics;
use crate::notify::{Notifier, TradeExecutor};
use crate::parser::programs::KnownPrograms;
use crate::queue::{QueueReceiver, QueueSender, bounded_queue};
use crate::registry::{InterestRegistry, InterestSource};

pub use dispatcher::Dispatcher;
pub use matcher::{MatchOutcome, Matcher, render_message};

/// Réglages du moteur, indépendants de la façon dont ils sont chargés.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub worker_count: usize,
    pub log_buffer_size: usize,
    pub notification_buffer_size: usize,
    pub notification_rate_limit: u32,
    pub trade_hook_concurrency: usize,
    pub subscription_buffer: usize,
    pub resync_interval: Duration,
    pub programs: Vec<Pubkey>,
    pub extra_swap_programs: Vec<Pubkey>,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            worker_count: config.worker_count,
            log_buffer_size: config.log_buffer_size,
            notification_buffer_size: config.notification_buffer_size,
            notification_rate_limit: config.notification_rate_limit,
            trade_hook_concurrency: config.trade_hook_concurrency,
            subscription_buffer: config.stream_subscription_buffer,
            resync_interval: config.resync_interval(),
            programs: config.program_ids()?,
            extra_swap_programs: config.extra_swap_programs()?,
        })
    }
}

pub struct FanOutEngine {
    settings: EngineSettings,
    client: StreamClient,
    registry: Arc<dyn InterestRegistry>,
    source: Arc<dyn InterestSource>,
    known_programs: Arc<KnownPrograms>,
    matcher: Arc<Matcher>,
    dispatcher: Arc<Dispatcher>,
    raw_tx: QueueSender<RawEvent>,
    raw_rx: QueueReceiver<RawEvent>,
    notifications_rx: QueueReceiver<DispatchUnit>,
    /// Programme suivi -> génération de son transfert.
    watched: Arc<Mutex<HashMap<Pubkey, u64>>>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl FanOutEngine {
    pub fn new(
        settings: EngineSettings,
        client: StreamClient,
        registry: Arc<dyn InterestRegistry>,
        source: Arc<dyn InterestSource>,
        notifier: Arc<dyn Notifier>,
        executor: Option<Arc<dyn TradeExecutor>>,
    ) -> Self {
        let known_programs = Arc::new(KnownPrograms::with_extra(&settings.extra_swap_programs));
        let (raw_tx, raw_rx) = bounded_queue("raw_events", settings.log_buffer_size);
        let (notifications_tx, notifications_rx) = bounded_queue("notifications", settings.notification_buffer_size);
        let matcher = Arc::new(Matcher::new(registry.clone(), known_programs.clone(), notifications_tx));
        let dispatcher = Arc::new(Dispatcher::new(
            notifier,
            executor,
            settings.notification_rate_limit,
            settings.trade_hook_concurrency,
        ));
        Self {
            settings,
            client,
            registry,
            source,
            known_programs,
            matcher,
            dispatcher,
            raw_tx,
            raw_rx,
            notifications_rx,
            watched: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn from_config(
        config: &Config,
        registry: Arc<dyn InterestRegistry>,
        source: Arc<dyn InterestSource>,
        notifier: Arc<dyn Notifier>,
        executor: Option<Arc<dyn TradeExecutor>>,
    ) -> Result<Self> {
        let settings = EngineSettings::from_config(config)?;
        let client = StreamClient::new(StreamClientConfig::from_config(config)?);
        Ok(Self::new(settings, client, registry, source, notifier, executor))
    }

    /// Démarre le pipeline. Seuls le resync initial et la connexion initiale sont fatals ;
    /// un programme impossible à suivre est logué et le moteur continue sans lui.
    pub async fn start(&self) -> Result<()> {
        let count = self.resync().await.context("Resync initial du registre impossible")?;
        info!(monitored = count, "[Engine] Registre chargé.");

        self.client.connect().await.context("Connexion initiale au stream impossible")?;

        for id in 0..self.settings.worker_count {
            let matcher = self.matcher.clone();
            let queue = self.raw_rx.clone();
            let shutdown = self.shutdown.clone();
            self.tasks.spawn(worker_loop(id, matcher, queue, shutdown));
        }
        self.tasks.spawn(self.dispatcher.clone().run(
            self.notifications_rx.clone(),
            self.shutdown.clone(),
            self.tasks.clone(),
        ));
        self.spawn_resync_loop();

        for program in self.settings.programs.clone() {
            if let Err(e) = self.watch_program(program).await {
                error!(program = %program, error = %e, "[Engine] Abonnement impossible, programme ignoré.");
            }
        }
        info!(
            workers = self.settings.worker_count,
            programs = self.watched.lock().await.len(),
            "[Engine] Pipeline démarré."
        );
        Ok(())
    }

    /// Abonne le stream à un programme et branche son canal sur la file brute. Idempotent.
    ///
    /// Un programme dont l'abonnement a été refusé ou perdu côté client est réabonné.
    pub async fn watch_program(&self, program: Pubkey) -> Result<(), IngestionError> {
        let mut watched = self.watched.lock().await;
        if watched.contains_key(&program) {
            if self.client.is_subscribed(&program).await {
                return Ok(());
            }
            watched.remove(&program);
        }
        let receiver = self.client.subscribe_program_logs(&program, self.settings.subscription_buffer).await?;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.tasks.spawn(forward_events(
            program,
            generation,
            receiver,
            self.raw_tx.clone(),
            self.watched.clone(),
            self.shutdown.clone(),
        ));
        watched.insert(program, generation);
        Ok(())
    }

    /// Le transfert associé s'arrête de lui-même quand le client ferme le canal.
    pub async fn unwatch_program(&self, program: &Pubkey) {
        let mut watched = self.watched.lock().await;
        if watched.remove(program).is_some() {
            self.client.unsubscribe(program).await;
            info!(program = %program, "[Engine] Programme retiré du stream.");
        }
    }

    pub async fn watched_programs(&self) -> Vec<Pubkey> {
        self.watched.lock().await.keys().copied().collect()
    }

    /// Ajoute un programme à la liste blanche des swaps, sans redémarrage.
    pub fn add_swap_program(&self, program: Pubkey, name: &str) -> bool {
        let added = self.known_programs.add(program, name);
        if added {
            info!(program = %program, name, "[Engine] Nouveau programme de swap reconnu.");
        }
        added
    }

    /// Remplace le registre par la liste de la source de vérité. Retourne le nombre d'adresses surveillées.
    pub async fn resync(&self) -> Result<u64> {
        let outcome = sync_registry(self.registry.as_ref(), self.source.as_ref()).await;
        record_resync(&outcome);
        outcome
    }

    pub async fn add_interest(
        &self,
        address: &Pubkey,
        subscriber: &SubscriberId,
        params: SubscriptionParams,
    ) -> Result<(), RegistryError> {
        self.registry.add_interest(address, subscriber, params).await?;
        self.refresh_monitored_gauge().await;
        Ok(())
    }

    pub async fn remove_interest(&self, address: &Pubkey, subscriber: &SubscriberId) -> Result<(), RegistryError> {
        self.registry.remove_interest(address, subscriber).await?;
        self.refresh_monitored_gauge().await;
        Ok(())
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn stream(&self) -> &StreamClient {
        &self.client
    }

    /// Arrêt ordonné : signal, fermeture du stream, attente de toutes les tâches. Idempotent.
    pub async fn shutdown(&self) {
        info!("[Engine] Arrêt demandé.");
        self.shutdown.cancel();
        self.client.close().await;
        self.tasks.close();
        self.tasks.wait().await;
        metrics::QUEUE_DEPTH.with_label_values(&["raw_events"]).set(0);
        metrics::QUEUE_DEPTH.with_label_values(&["notifications"]).set(0);
        info!("[Engine] Toutes les tâches sont terminées.");
    }

    async fn refresh_monitored_gauge(&self) {
        match self.registry.monitored_count().await {
            Ok(count) => metrics::MONITORED_ADDRESSES.set(count as i64),
            Err(e) => debug!(error = %e, "[Registry] Comptage impossible."),
        }
    }

    fn spawn_resync_loop(&self) {
        let registry = self.registry.clone();
        let source = self.source.clone();
        let period = self.settings.resync_interval;
        let shutdown = self.shutdown.clone();
        self.tasks.spawn(async move {
            if period.is_zero() {
                info!("[Resync] Resynchronisation périodique désactivée.");
                return;
            }
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let started = std::time::Instant::now();
                let outcome = sync_registry(registry.as_ref(), source.as_ref()).await;
                record_resync(&outcome);
                match outcome {
                    Ok(count) => {
                        info!(monitored = count, elapsed_ms = started.elapsed().as_millis() as u64, "[Resync] Registre resynchronisé.");
                    }
                    Err(e) => {
                        warn!(error = %e, "[Resync] Échec, l'état précédent est conservé.");
                    }
                }
            }
        });
    }
}

async fn sync_registry(registry: &dyn InterestRegistry, source: &dyn InterestSource) -> Result<u64> {
    let interests = source.list_active_interests().await?;
    registry.full_resync(&interests).await?;
    Ok(registry.monitored_count().await?)
}

fn record_resync(outcome: &Result<u64>) {
    match outcome {
        Ok(count) => {
            metrics::RESYNC_TOTAL.with_label_values(&["success"]).inc();
            metrics::MONITORED_ADDRESSES.set(*count as i64);
        }
        Err(_) => {
            metrics::RESYNC_TOTAL.with_label_values(&["failure"]).inc();
            metrics::REGISTRY_ERRORS.with_label_values(&["full_resync"]).inc();
        }
    }
}

async fn worker_loop(id: usize, matcher: Arc<Matcher>, queue: QueueReceiver<RawEvent>, shutdown: CancellationToken) {
    info!("[Worker {}] Démarrage.", id);
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = queue.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let outcome = matcher.process(&event).await;
        if let MatchOutcome::Dispatched { units, dropped } = outcome {
            debug!(worker = id, units, dropped, "[Worker {}] Correspondance distribuée.", id);
        }
    }
    info!("[Worker {}] Arrêt.", id);
}

async fn forward_events(
    program: Pubkey,
    generation: u64,
    mut receiver: mpsc::Receiver<RawEvent>,
    raw: QueueSender<RawEvent>,
    watched: Arc<Mutex<HashMap<Pubkey, u64>>>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => return,
            event = receiver.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        // Pleine : l'événement est perdu, `QUEUE_DROPPED{raw_events}` en garde la trace.
        let _ = raw.offer(event);
    }
    // Canal fermé par le client (refus du serveur, désabonnement). Un transfert plus récent garde son entrée.
    let mut watched = watched.lock().await;
    if watched.get(&program) == Some(&generation) {
        watched.remove(&program);
        warn!(program = %program, "[Engine] Abonnement perdu, programme retiré de la liste suivie.");
    } else {
        debug!(program = %program, "[Engine] Canal d'abonnement fermé.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::Interest;
    use crate::ingestion::SubscribeMethod;
    use crate::notify::LogNotifier;
    use crate::registry::{MemoryInterestRegistry, StaticInterestSource};

    fn settings() -> EngineSettings {
        EngineSettings {
            worker_count: 2,
            log_buffer_size: 16,
            notification_buffer_size: 16,
            notification_rate_limit: 25,
            trade_hook_concurrency: 2,
            subscription_buffer: 16,
            resync_interval: Duration::from_secs(300),
            programs: vec![],
            extra_swap_programs: vec![],
        }
    }

    fn offline_client() -> StreamClient {
        StreamClient::new(StreamClientConfig {
            url: "ws://127.0.0.1:1".to_string(),
            method: SubscribeMethod::Transaction,
            commitment: "processed".to_string(),
            reconnect_delay: Duration::from_millis(50),
            ping_interval: Duration::from_secs(30),
            connect_per_sec: 10,
            requests_per_sec: 10,
            limiter_timeout: Duration::from_millis(500),
            connect_timeout: Duration::from_millis(500),
        })
    }

    fn interest(address: Pubkey, subscriber: &str, amount: f64) -> Interest {
        Interest {
            address,
            subscriber: SubscriberId::from(subscriber),
            params: SubscriptionParams::notify_only(amount),
        }
    }

    fn engine(registry: Arc<MemoryInterestRegistry>, source: Arc<StaticInterestSource>) -> FanOutEngine {
        FanOutEngine::new(settings(), offline_client(), registry, source, Arc::new(LogNotifier), None)
    }

    #[tokio::test]
    async fn resync_replaces_the_registry_state() {
        let registry = Arc::new(MemoryInterestRegistry::new());
        let stale = Pubkey::new_unique();
        registry
            .add_interest(&stale, &SubscriberId::from("old"), SubscriptionParams::notify_only(1.0))
            .await
            .unwrap();

        let fresh = Pubkey::new_unique();
        let source = Arc::new(StaticInterestSource::new(vec![
            interest(fresh, "u1", 1.0),
            interest(fresh, "u2", 2.0),
        ]));
        let engine = engine(registry.clone(), source);

        assert_eq!(engine.resync().await.unwrap(), 1);
        assert!(!registry.is_monitored(&stale).await.unwrap());
        assert_eq!(registry.get_subscribers(&fresh).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn start_fails_when_the_initial_resync_fails() {
        let registry = Arc::new(MemoryInterestRegistry::new());
        registry.set_unavailable(true);
        let engine = engine(registry, Arc::new(StaticInterestSource::default()));
        assert!(engine.start().await.is_err());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn start_fails_when_the_stream_is_unreachable() {
        let registry = Arc::new(MemoryInterestRegistry::new());
        let engine = engine(registry, Arc::new(StaticInterestSource::default()));
        assert!(engine.start().await.is_err());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn interests_pass_through_to_the_registry() {
        let registry = Arc::new(MemoryInterestRegistry::new());
        let engine = engine(registry.clone(), Arc::new(StaticInterestSource::default()));
        let wallet = Pubkey::new_unique();
        let user = SubscriberId::from("u1");

        engine.add_interest(&wallet, &user, SubscriptionParams::notify_only(0.1)).await.unwrap();
        assert!(registry.is_monitored(&wallet).await.unwrap());

        engine.remove_interest(&wallet, &user).await.unwrap();
        assert!(!registry.is_monitored(&wallet).await.unwrap());
    }

    #[tokio::test]
    async fn swap_programs_can_be_added_at_runtime() {
        let engine = engine(Arc::new(MemoryInterestRegistry::new()), Arc::new(StaticInterestSource::default()));
        let program = Pubkey::new_unique();
        assert!(engine.add_swap_program(program, "Nouveau DEX"));
        assert!(!engine.add_swap_program(program, "Nouveau DEX"));
    }

    #[tokio::test]
    async fn watching_without_a_connection_fails_cleanly() {
        let engine = engine(Arc::new(MemoryInterestRegistry::new()), Arc::new(StaticInterestSource::default()));
        let err = engine.watch_program(Pubkey::new_unique()).await.unwrap_err();
        assert!(matches!(err, IngestionError::NotConnected));
        assert!(engine.watched_programs().await.is_empty());
        engine.shutdown().await;
    }
}
