// DANS : src/ingestion/client.rs

//! Le client de stream : UNE connexion WebSocket, N abonnements multiplexés dessus.
//!
//! La table des enregistrements (programme -> canal) n'est modifiée que sous un seul verrou,
//! pris par subscribe / unsubscribe / reconnexion. La boucle de lecture, elle, route chaque
//! message via un instantané `ArcSwap` de la table (id serveur -> canal), sans aucun verrou.

use arc_swap::ArcSwap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::protocol::{Frame, SubscribeMethod, classify_frame};
use crate::communication::RawEvent;
use crate::config::Config;
use crate::error::IngestionError;
use crate::monitoring::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Sans aucune trame entrante pendant ce nombre d'intervalles de ping, la connexion est tenue pour morte.
const SILENCE_TOLERANCE: u32 = 2;

#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    pub url: String,
    pub method: SubscribeMethod,
    pub commitment: String,
    pub reconnect_delay: Duration,
    pub ping_interval: Duration,
    pub connect_per_sec: u32,
    pub requests_per_sec: u32,
    pub limiter_timeout: Duration,
    pub connect_timeout: Duration,
}

impl StreamClientConfig {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            url: config.stream_ws_url.clone(),
            method: config.subscribe_method()?,
            commitment: config.stream_commitment.clone(),
            reconnect_delay: Duration::from_millis(config.stream_reconnect_delay_ms),
            ping_interval: Duration::from_millis(config.stream_ping_interval_ms),
            connect_per_sec: config.stream_connect_per_sec,
            requests_per_sec: config.stream_requests_per_sec,
            limiter_timeout: Duration::from_millis(config.stream_limiter_timeout_ms),
            connect_timeout: Duration::from_millis(config.stream_connect_timeout_ms),
        })
    }
}

struct Registration {
    sender: mpsc::Sender<RawEvent>,
    request_id: u64,
    server_id: Option<u64>,
}

#[derive(Default)]
struct RegistrationTable {
    by_program: HashMap<Pubkey, Registration>,
    /// Requêtes d'abonnement en attente d'acquittement : id requête -> programme.
    pending: HashMap<u64, Pubkey>,
    /// Abonnements retirés avant leur acquittement : libérés côté serveur dès l'acquittement.
    abandoned: HashSet<u64>,
}

#[derive(Clone)]
struct Route {
    program: Arc<str>,
    sender: mpsc::Sender<RawEvent>,
}

enum TokenWait {
    Cancelled,
    TimedOut,
}

struct ClientInner {
    config: StreamClientConfig,
    connect_limiter: DirectLimiter,
    request_limiter: DirectLimiter,
    writer: Mutex<Option<WsWriter>>,
    connected: AtomicBool,
    epoch: AtomicU64,
    connection_token: std::sync::Mutex<Option<CancellationToken>>,
    table: Mutex<RegistrationTable>,
    routes: ArcSwap<HashMap<u64, Route>>,
    next_request_id: AtomicU64,
    dropped: AtomicU64,
    started: Instant,
    last_inbound_ms: AtomicU64,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

/// Poignée clonable sur le client.
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<ClientInner>,
}

fn per_second(n: u32) -> DirectLimiter {
    RateLimiter::direct(Quota::per_second(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)))
}

impl StreamClient {
    pub fn new(config: StreamClientConfig) -> Self {
        let inner = ClientInner {
            connect_limiter: per_second(config.connect_per_sec),
            request_limiter: per_second(config.requests_per_sec),
            config,
            writer: Mutex::new(None),
            connected: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            connection_token: std::sync::Mutex::new(None),
            table: Mutex::new(RegistrationTable::default()),
            routes: ArcSwap::from_pointee(HashMap::new()),
            next_request_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
            started: Instant::now(),
            last_inbound_ms: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        };
        Self { inner: Arc::new(inner) }
    }

    /// Établit la connexion et lance les boucles de lecture et de keepalive.
    pub async fn connect(&self) -> Result<(), IngestionError> {
        self.inner.connect().await
    }

    /// Abonne le client aux logs d'un programme. Le canal retourné reçoit les messages bruts.
    pub async fn subscribe_program_logs(
        &self,
        program: &Pubkey,
        buffer: usize,
    ) -> Result<mpsc::Receiver<RawEvent>, IngestionError> {
        self.inner.subscribe(program, buffer).await
    }

    /// Ferme et retire le canal d'un abonnement. Idempotent.
    pub async fn unsubscribe(&self, program: &Pubkey) {
        self.inner.unsubscribe(program).await;
    }

    /// Arrêt : signal diffusé, canaux fermés, connexion fermée, attente de toutes les tâches.
    /// Idempotent, et sans danger avant `connect`.
    pub async fn close(&self) {
        self.inner.close().await;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Messages abandonnés parce que le canal de l'abonnement était plein.
    pub fn dropped_messages(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub async fn is_subscribed(&self, program: &Pubkey) -> bool {
        self.inner.table.lock().await.by_program.contains_key(program)
    }

    pub async fn subscribed_programs(&self) -> Vec<Pubkey> {
        self.inner.table.lock().await.by_program.keys().copied().collect()
    }

    /// Nombre d'abonnements acquittés par le serveur (donc routables).
    pub fn active_routes(&self) -> usize {
        self.inner.routes.load().len()
    }
}

impl ClientInner {
    fn touch(&self) {
        self.last_inbound_ms.store(self.started.elapsed().as_millis() as u64, Ordering::Release);
    }

    fn inbound_silence(&self) -> Duration {
        let last = Duration::from_millis(self.last_inbound_ms.load(Ordering::Acquire));
        self.started.elapsed().saturating_sub(last)
    }

    async fn wait_token(&self, limiter: &DirectLimiter) -> Result<(), TokenWait> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(TokenWait::Cancelled),
            waited = tokio::time::timeout(self.config.limiter_timeout, limiter.until_ready()) => {
                waited.map_err(|_| TokenWait::TimedOut)
            }
        }
    }

    async fn connect(self: &Arc<Self>) -> Result<(), IngestionError> {
        if self.shutdown.is_cancelled() {
            return Err(IngestionError::Closed);
        }
        match self.wait_token(&self.connect_limiter).await {
            Ok(()) => {}
            Err(TokenWait::Cancelled) => return Err(IngestionError::Closed),
            Err(TokenWait::TimedOut) => {
                return Err(IngestionError::Connection("quota de connexion : attente expirée".to_string()));
            }
        }

        info!(url = %self.config.url, "[Stream] Connexion au fournisseur de stream.");
        let (ws, _response) = tokio::time::timeout(self.config.connect_timeout, connect_async(self.config.url.as_str()))
            .await
            .map_err(|_| IngestionError::Connection("délai de connexion dépassé".to_string()))?
            .map_err(|e| IngestionError::Connection(e.to_string()))?;
        let (writer, reader) = ws.split();

        if self.shutdown.is_cancelled() {
            return Err(IngestionError::Closed);
        }

        *self.writer.lock().await = Some(writer);
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let connection = self.shutdown.child_token();
        if let Ok(mut slot) = self.connection_token.lock() {
            if let Some(previous) = slot.replace(connection.clone()) {
                previous.cancel();
            }
        }
        self.touch();
        self.connected.store(true, Ordering::Release);
        metrics::STREAM_CONNECTED.set(1);

        let inner = self.clone();
        let token = connection.clone();
        self.tasks.spawn(async move { inner.read_loop(reader, token, epoch).await });
        let inner = self.clone();
        self.tasks.spawn(async move { inner.keepalive_loop(connection, epoch).await });

        info!(epoch, "[Stream] Connexion établie.");
        Ok(())
    }

    async fn subscribe(self: &Arc<Self>, program: &Pubkey, buffer: usize) -> Result<mpsc::Receiver<RawEvent>, IngestionError> {
        if self.shutdown.is_cancelled() {
            return Err(IngestionError::Closed);
        }
        match self.wait_token(&self.request_limiter).await {
            Ok(()) => {}
            Err(TokenWait::Cancelled) => return Err(IngestionError::Closed),
            Err(TokenWait::TimedOut) => {
                return Err(IngestionError::Subscription {
                    program: program.to_string(),
                    reason: "quota de requêtes : attente expirée".to_string(),
                });
            }
        }
        if !self.connected.load(Ordering::Acquire) {
            return Err(IngestionError::NotConnected);
        }

        let mut table = self.table.lock().await;
        if table.by_program.contains_key(program) {
            return Err(IngestionError::Subscription {
                program: program.to_string(),
                reason: "déjà abonné".to_string(),
            });
        }

        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        table.by_program.insert(*program, Registration { sender, request_id, server_id: None });
        table.pending.insert(request_id, *program);

        let request = self.config.method.subscribe_request(request_id, program, &self.config.commitment);
        if let Err(e) = self.send_json(&request).await {
            // Le canal devient orphelin : on le retire avant de rendre l'erreur.
            table.by_program.remove(program);
            table.pending.remove(&request_id);
            return Err(IngestionError::Subscription { program: program.to_string(), reason: e.to_string() });
        }
        info!(program = %program, request_id, "[Stream] Demande d'abonnement envoyée.");
        Ok(receiver)
    }

    async fn resubscribe(self: &Arc<Self>, program: &Pubkey) -> Result<(), IngestionError> {
        match self.wait_token(&self.request_limiter).await {
            Ok(()) => {}
            Err(TokenWait::Cancelled) => return Err(IngestionError::Closed),
            Err(TokenWait::TimedOut) => {
                return Err(IngestionError::Subscription {
                    program: program.to_string(),
                    reason: "quota de requêtes : attente expirée".to_string(),
                });
            }
        }
        let mut table = self.table.lock().await;
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        // Désabonné pendant la reconnexion : rien à faire.
        let Some(registration) = table.by_program.get_mut(program) else {
            return Ok(());
        };
        registration.request_id = request_id;
        registration.server_id = None;
        table.pending.insert(request_id, *program);

        let request = self.config.method.subscribe_request(request_id, program, &self.config.commitment);
        self.send_json(&request).await.map_err(|e| IngestionError::Subscription {
            program: program.to_string(),
            reason: e.to_string(),
        })
    }

    async fn unsubscribe(&self, program: &Pubkey) {
        let removed = {
            let mut table = self.table.lock().await;
            let removed = table.by_program.remove(program);
            if let Some(registration) = &removed {
                if table.pending.remove(&registration.request_id).is_some() {
                    table.abandoned.insert(registration.request_id);
                }
                self.publish_routes(&table);
            }
            removed
        };
        let Some(registration) = removed else {
            return;
        };
        if let Some(server_id) = registration.server_id {
            if self.connected.load(Ordering::Acquire) {
                let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
                let request = self.config.method.unsubscribe_request(request_id, server_id);
                if let Err(e) = self.send_json(&request).await {
                    debug!(program = %program, error = %e, "[Stream] Désabonnement côté serveur non envoyé.");
                }
            }
        }
        info!(program = %program, "[Stream] Abonnement retiré.");
    }

    async fn close(&self) {
        self.shutdown.cancel();
        {
            let mut table = self.table.lock().await;
            table.by_program.clear();
            table.pending.clear();
            table.abandoned.clear();
            self.routes.store(Arc::new(HashMap::new()));
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.close().await;
        }
        if self.connected.swap(false, Ordering::AcqRel) {
            metrics::STREAM_CONNECTED.set(0);
        }
        self.tasks.close();
        self.tasks.wait().await;
    }

    async fn send_json(&self, request: &Value) -> Result<(), IngestionError> {
        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(IngestionError::NotConnected);
        };
        writer
            .send(Message::Text(request.to_string().into()))
            .await
            .map_err(|e| IngestionError::Connection(e.to_string()))
    }

    /// Reconstruit l'instantané de routage depuis la table. Appelé sous le verrou de la table.
    fn publish_routes(&self, table: &RegistrationTable) {
        let routes: HashMap<u64, Route> = table
            .by_program
            .iter()
            .filter_map(|(program, registration)| {
                registration.server_id.map(|server_id| {
                    (
                        server_id,
                        Route { program: Arc::from(program.to_string()), sender: registration.sender.clone() },
                    )
                })
            })
            .collect();
        self.routes.store(Arc::new(routes));
    }

    async fn read_loop(self: Arc<Self>, mut reader: WsReader, connection: CancellationToken, epoch: u64) {
        let cause = loop {
            let next = tokio::select! {
                _ = connection.cancelled() => return,
                next = reader.next() => next,
            };
            if matches!(next, Some(Ok(_))) {
                self.touch();
            }
            match next {
                Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()).await,
                Some(Ok(Message::Binary(bytes))) => {
                    if let Ok(text) = std::str::from_utf8(&bytes) {
                        self.handle_text(text).await;
                    }
                }
                Some(Ok(Message::Close(frame))) => break format!("fermeture par le serveur ({frame:?})"),
                Some(Ok(_)) => {}
                Some(Err(e)) => break format!("erreur de lecture : {e}"),
                None => break "fin du stream".to_string(),
            }
        };
        self.connection_lost(epoch, &cause);
    }

    async fn handle_text(self: &Arc<Self>, text: &str) {
        metrics::STREAM_MESSAGES_RECEIVED.inc();
        match classify_frame(text) {
            Frame::Notification { server_id } => self.route(server_id, text),
            Frame::Ack { request_id, server_id } => self.confirm_subscription(request_id, server_id).await,
            Frame::Rejected { request_id, reason } => {
                let program = {
                    let mut table = self.table.lock().await;
                    table.abandoned.remove(&request_id);
                    let program = table.pending.remove(&request_id);
                    if let Some(program) = program {
                        // Abonnement refusé : on ferme son canal plutôt que de le laisser muet.
                        if table.by_program.get(&program).is_some_and(|r| r.request_id == request_id) {
                            table.by_program.remove(&program);
                        }
                    }
                    program
                };
                match program {
                    Some(program) => error!(program = %program, reason = %reason, "[Stream] Abonnement refusé par le serveur."),
                    None => debug!(request_id, reason = %reason, "[Stream] Requête refusée par le serveur."),
                }
            }
            Frame::Reply { .. } | Frame::Unknown => {}
        }
    }

    /// Chemin chaud : lecture de l'instantané, envoi non bloquant, perte si le canal est plein.
    fn route(&self, server_id: u64, text: &str) {
        let routes = self.routes.load();
        let Some(route) = routes.get(&server_id) else {
            debug!(server_id, "[Stream] Notification pour un abonnement inconnu.");
            return;
        };
        let event = RawEvent { program: route.program.clone(), payload: text.to_string() };
        match route.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::QUEUE_DROPPED.with_label_values(&["subscription"]).inc();
            }
            Err(TrySendError::Closed(_)) => {
                debug!(program = %route.program, "[Stream] Canal de l'abonnement fermé.");
            }
        }
    }

    async fn confirm_subscription(self: &Arc<Self>, request_id: u64, server_id: u64) {
        let mut table = self.table.lock().await;
        let Some(program) = table.pending.remove(&request_id) else {
            if table.abandoned.remove(&request_id) {
                drop(table);
                debug!(request_id, server_id, "[Stream] Abonnement retiré avant son acquittement.");
                self.release_server_subscription(server_id).await;
            }
            return;
        };
        let confirmed = match table.by_program.get_mut(&program) {
            Some(registration) if registration.request_id == request_id => {
                registration.server_id = Some(server_id);
                true
            }
            _ => false,
        };
        if confirmed {
            self.publish_routes(&table);
            info!(program = %program, server_id, "[Stream] Abonnement confirmé.");
            return;
        }
        drop(table);
        // Acquittement d'un abonnement remplacé entre-temps.
        self.release_server_subscription(server_id).await;
    }

    /// Désabonnement côté serveur d'un id que plus aucun enregistrement ne route.
    async fn release_server_subscription(&self, server_id: u64) {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.send_json(&self.config.method.unsubscribe_request(id, server_id)).await {
            debug!(server_id, error = %e, "[Stream] Libération côté serveur non envoyée.");
        }
    }

    async fn keepalive_loop(self: Arc<Self>, connection: CancellationToken, epoch: u64) {
        let mut ticker = tokio::time::interval(self.config.ping_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = connection.cancelled() => return,
                _ = ticker.tick() => {}
            }
            // Socket à moitié ouverte : le ping s'écrit sans erreur, seul le silence entrant la trahit.
            let silence = self.inbound_silence();
            if silence > self.config.ping_interval * SILENCE_TOLERANCE {
                self.connection_lost(epoch, &format!("aucune trame reçue depuis {} ms", silence.as_millis()));
                return;
            }
            let sent = {
                let mut writer = self.writer.lock().await;
                match writer.as_mut() {
                    Some(writer) => {
                        match tokio::time::timeout(self.config.ping_interval, writer.send(Message::Ping(Vec::new().into()))).await {
                            Ok(Ok(())) => Ok(()),
                            Ok(Err(e)) => Err(e.to_string()),
                            Err(_) => Err("ping sans réponse".to_string()),
                        }
                    }
                    None => Err("connexion absente".to_string()),
                }
            };
            if let Err(e) = sent {
                self.connection_lost(epoch, &format!("échec du ping : {e}"));
                return;
            }
        }
    }

    /// Appelé par la boucle de lecture ou le keepalive. Une seule reconnexion par connexion perdue.
    fn connection_lost(self: &Arc<Self>, epoch: u64, cause: &str) {
        if self.shutdown.is_cancelled() || self.epoch.load(Ordering::Acquire) != epoch {
            return;
        }
        if self.connected.compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return;
        }
        metrics::STREAM_CONNECTED.set(0);
        if let Ok(slot) = self.connection_token.lock() {
            if let Some(token) = slot.as_ref() {
                token.cancel();
            }
        }
        warn!(epoch, cause = %cause, "[Stream] Connexion perdue. Reconnexion programmée.");
        let inner = self.clone();
        self.tasks.spawn(async move { inner.reconnect().await });
    }

    async fn reconnect(self: Arc<Self>) {
        // Instantané des abonnements sous verrou, avant de reconnecter.
        let snapshot: Vec<Pubkey> = {
            let mut table = self.table.lock().await;
            table.pending.clear();
            table.abandoned.clear();
            for registration in table.by_program.values_mut() {
                registration.server_id = None;
            }
            self.routes.store(Arc::new(HashMap::new()));
            table.by_program.keys().copied().collect()
        };
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.close().await;
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
            metrics::STREAM_RECONNECTS.inc();
            match self.connect().await {
                Ok(()) => break,
                Err(IngestionError::Closed) => return,
                Err(e) => warn!(error = %e, "[Stream] Reconnexion échouée. Nouvelle tentative."),
            }
        }

        info!(count = snapshot.len(), "[Stream] Réabonnement des programmes après reconnexion.");
        for program in snapshot {
            if let Err(e) = self.resubscribe(&program).await {
                match e {
                    IngestionError::Closed => return,
                    e => warn!(program = %program, error = %e, "[Stream] Réabonnement échoué."),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(url: &str) -> StreamClientConfig {
        StreamClientConfig {
            url: url.to_string(),
            method: SubscribeMethod::Logs,
            commitment: "processed".to_string(),
            reconnect_delay: Duration::from_millis(20),
            ping_interval: Duration::from_secs(30),
            connect_per_sec: 50,
            requests_per_sec: 50,
            limiter_timeout: Duration::from_millis(500),
            connect_timeout: Duration::from_millis(500),
        }
    }

    const PROGRAM: Pubkey = solana_sdk::pubkey!("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4");

    #[tokio::test]
    async fn subscribe_without_connection_fails() {
        let client = StreamClient::new(test_config("ws://127.0.0.1:1"));
        let err = client.subscribe_program_logs(&PROGRAM, 8).await.expect_err("pas de connexion");
        assert!(matches!(err, IngestionError::NotConnected));
        assert!(client.subscribed_programs().await.is_empty());
    }

    #[tokio::test]
    async fn close_before_connect_is_safe_and_idempotent() {
        let client = StreamClient::new(test_config("ws://127.0.0.1:1"));
        client.close().await;
        client.close().await;
        assert!(!client.is_connected());
        assert!(matches!(client.connect().await, Err(IngestionError::Closed)));
    }

    #[tokio::test]
    async fn unsubscribe_unknown_program_is_a_no_op() {
        let client = StreamClient::new(test_config("ws://127.0.0.1:1"));
        client.unsubscribe(&PROGRAM).await;
        client.unsubscribe(&PROGRAM).await;
        assert!(client.subscribed_programs().await.is_empty());
    }

    #[tokio::test]
    async fn failed_dial_is_a_connection_error() {
        // Port 1 : rien n'écoute, le dial échoue.
        let client = StreamClient::new(test_config("ws://127.0.0.1:1"));
        let err = client.connect().await.expect_err("dial impossible");
        assert!(matches!(err, IngestionError::Connection(_)));
        client.close().await;
    }

    #[tokio::test]
    async fn full_subscription_channel_drops_and_counts() {
        let client = StreamClient::new(test_config("ws://127.0.0.1:1"));
        let (sender, _receiver) = mpsc::channel(1);
        {
            let mut table = client.inner.table.lock().await;
            table.by_program.insert(PROGRAM, Registration { sender, request_id: 1, server_id: Some(77) });
            client.inner.publish_routes(&table);
        }
        assert_eq!(client.active_routes(), 1);
        let notification = r#"{"jsonrpc":"2.0","method":"logsNotification","params":{"subscription":77,"result":{}}}"#;
        client.inner.route(77, notification);
        client.inner.route(77, notification);
        client.inner.route(77, notification);
        assert_eq!(client.dropped_messages(), 2);
    }
}
