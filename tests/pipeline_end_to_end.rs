// Du stream jusqu'au notifier : faux fournisseur WebSocket, registre en mémoire, collaborateurs enregistreurs.

use anyhow::Result;
use async_trait::async_trait;
use fanout::communication::{CopyTradeOrder, Interest, SubscriberId, SubscriptionParams};
use fanout::engine::{EngineSettings, FanOutEngine};
use fanout::ingestion::{StreamClient, StreamClientConfig, SubscribeMethod};
use fanout::notify::{Notifier, TradeExecutor};
use fanout::parser::programs::JUPITER_V6;
use fanout::registry::{InterestRegistry, MemoryInterestRegistry, StaticInterestSource};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use solana_sdk::pubkey::Pubkey;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, subscriber: &SubscriberId, message: &str) -> Result<()> {
        self.sent.lock().unwrap().push((subscriber.0.clone(), message.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingExecutor {
    orders: Mutex<Vec<CopyTradeOrder>>,
}

#[async_trait]
impl TradeExecutor for RecordingExecutor {
    async fn execute(&self, order: &CopyTradeOrder) -> Result<()> {
        self.orders.lock().unwrap().push(order.clone());
        Ok(())
    }
}

fn swap_notification(server_id: u64, wallet: &Pubkey, signature: &str) -> String {
    let owner = wallet.to_string();
    json!({
        "jsonrpc": "2.0",
        "method": "transactionNotification",
        "params": {"subscription": server_id, "result": {
            "signature": signature,
            "slot": 7,
            "transaction": {
                "blockTime": 1_700_000_000,
                "transaction": {
                    "signatures": [signature],
                    "message": {"accountKeys": [
                        {"pubkey": owner, "signer": true, "writable": true},
                        {"pubkey": JUPITER_V6.to_string(), "signer": false, "writable": false}
                    ]}
                },
                "meta": {
                    "err": null,
                    "fee": 5000,
                    "preBalances": [2_000_000_000u64, 1],
                    "postBalances": [1_500_000_000u64, 1],
                    "preTokenBalances": [],
                    "postTokenBalances": [{
                        "accountIndex": 2,
                        "mint": BONK,
                        "owner": owner,
                        "uiTokenAmount": {"amount": "42000", "decimals": 5}
                    }],
                    "logMessages": [
                        format!("Program {} invoke [1]", JUPITER_V6),
                        "Program log: Instruction: Route",
                        format!("Program {} success", JUPITER_V6)
                    ]
                }
            }
        }}
    })
    .to_string()
}

/// Acquitte l'abonnement puis pousse les notifications fournies par le test.
async fn spawn_provider(events: Vec<(Pubkey, &'static str)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}", listener.local_addr().expect("addr"));
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else { return };
        let Ok(mut ws) = accept_async(stream).await else { return };
        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else { continue };
            let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else { continue };
            if request["method"] != "transactionSubscribe" {
                continue;
            }
            let ack = json!({"jsonrpc": "2.0", "id": request["id"], "result": 9});
            let _ = ws.send(Message::Text(ack.to_string().into())).await;
            for (wallet, signature) in &events {
                let _ = ws.send(Message::Text(swap_notification(9, wallet, signature).into())).await;
            }
        }
    });
    url
}

fn settings() -> EngineSettings {
    EngineSettings {
        worker_count: 4,
        log_buffer_size: 64,
        notification_buffer_size: 64,
        notification_rate_limit: 1_000,
        trade_hook_concurrency: 4,
        subscription_buffer: 64,
        resync_interval: Duration::from_secs(300),
        programs: vec![JUPITER_V6],
        extra_swap_programs: vec![],
    }
}

fn client(url: String) -> StreamClient {
    StreamClient::new(StreamClientConfig {
        url,
        method: SubscribeMethod::Transaction,
        commitment: "processed".to_string(),
        reconnect_delay: Duration::from_millis(100),
        ping_interval: Duration::from_secs(30),
        connect_per_sec: 10,
        requests_per_sec: 10,
        limiter_timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_secs(2),
    })
}

#[tokio::test]
async fn monitored_swap_fans_out_to_every_subscriber() {
    fanout::monitoring::logging::try_setup_test_logging();

    let target = Pubkey::new_unique();
    let stranger = Pubkey::new_unique();
    let url = spawn_provider(vec![(stranger, "sigStranger"), (target, "sigTarget")]).await;

    let registry = Arc::new(MemoryInterestRegistry::new());
    let source = Arc::new(StaticInterestSource::new(vec![
        Interest {
            address: target,
            subscriber: SubscriberId::from("111"),
            params: SubscriptionParams::notify_only(0.5),
        },
        Interest {
            address: target,
            subscriber: SubscriberId::from("222"),
            params: SubscriptionParams { copy_amount_sol: 2.0, auto_execute: true },
        },
    ]));
    let notifier = Arc::new(RecordingNotifier::default());
    let executor = Arc::new(RecordingExecutor::default());

    let engine = FanOutEngine::new(
        settings(),
        client(url),
        registry.clone(),
        source,
        notifier.clone(),
        Some(executor.clone()),
    );
    engine.start().await.expect("démarrage");
    assert!(registry.is_monitored(&target).await.unwrap());

    timeout(Duration::from_secs(5), async {
        while notifier.sent.lock().unwrap().len() < 2 || executor.orders.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("notifications jamais reçues");
    // Le portefeuille inconnu ne doit rien produire.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut sent = notifier.sent.lock().unwrap().clone();
    sent.sort();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, "111");
    assert_eq!(sent[1].0, "222");
    for (_, message) in &sent {
        assert!(message.contains("sigTarget"));
        assert!(message.contains(&target.to_string()));
        assert!(!message.contains("sigStranger"));
    }
    assert!(sent[0].1.contains("0.5 SOL"));
    assert!(sent[1].1.contains("2 SOL"));

    let orders = executor.orders.lock().unwrap().clone();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].subscriber.0, "222");
    assert_eq!(orders[0].copy_amount_sol, 2.0);
    assert_eq!(orders[0].output_mint, BONK);
    assert!(!orders[0].approximate);

    assert_eq!(engine.watched_programs().await, vec![JUPITER_V6]);
    engine.shutdown().await;
    engine.shutdown().await;
}

/// Refuse le premier abonnement, acquitte les suivants. Compte les demandes reçues.
async fn spawn_rejecting_provider(requests: Arc<AtomicUsize>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}", listener.local_addr().expect("addr"));
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else { return };
        let Ok(mut ws) = accept_async(stream).await else { return };
        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else { continue };
            let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else { continue };
            if request["method"] != "transactionSubscribe" {
                continue;
            }
            let reply = if requests.fetch_add(1, Ordering::SeqCst) == 0 {
                json!({"jsonrpc": "2.0", "id": request["id"], "error": {"code": -32602, "message": "nope"}})
            } else {
                json!({"jsonrpc": "2.0", "id": request["id"], "result": 9})
            };
            let _ = ws.send(Message::Text(reply.to_string().into())).await;
        }
    });
    url
}

#[tokio::test]
async fn rejected_program_can_be_watched_again() {
    fanout::monitoring::logging::try_setup_test_logging();

    let requests = Arc::new(AtomicUsize::new(0));
    let url = spawn_rejecting_provider(requests.clone()).await;
    let engine = FanOutEngine::new(
        settings(),
        client(url),
        Arc::new(MemoryInterestRegistry::new()),
        Arc::new(StaticInterestSource::new(vec![])),
        Arc::new(RecordingNotifier::default()),
        None,
    );
    engine.start().await.expect("démarrage");

    // Le refus retire l'abonnement côté client, puis côté moteur.
    timeout(Duration::from_secs(5), async {
        while !engine.stream().subscribed_programs().await.is_empty() || !engine.watched_programs().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("le refus n'a jamais été pris en compte");
    assert_eq!(requests.load(Ordering::SeqCst), 1);

    engine.watch_program(JUPITER_V6).await.expect("nouvel abonnement");
    timeout(Duration::from_secs(5), async {
        while engine.stream().active_routes() != 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("acquittement jamais traité");
    assert_eq!(requests.load(Ordering::SeqCst), 2);
    assert_eq!(engine.watched_programs().await, vec![JUPITER_V6]);

    // Déjà suivi et acquitté : aucune nouvelle demande.
    engine.watch_program(JUPITER_V6).await.expect("idempotent");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(requests.load(Ordering::SeqCst), 2);

    engine.shutdown().await;
}

#[tokio::test]
async fn stale_watch_entry_is_resubscribed_before_its_forwarder_notices() {
    fanout::monitoring::logging::try_setup_test_logging();

    let requests = Arc::new(AtomicUsize::new(0));
    let url = spawn_rejecting_provider(requests.clone()).await;
    let engine = FanOutEngine::new(
        settings(),
        client(url),
        Arc::new(MemoryInterestRegistry::new()),
        Arc::new(StaticInterestSource::new(vec![])),
        Arc::new(RecordingNotifier::default()),
        None,
    );
    engine.start().await.expect("démarrage");

    // Seul le client est attendu ici : l'entrée du moteur peut encore être présente.
    timeout(Duration::from_secs(5), async {
        while !engine.stream().subscribed_programs().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("le refus n'a jamais été pris en compte");

    engine.watch_program(JUPITER_V6).await.expect("nouvel abonnement");
    timeout(Duration::from_secs(5), async {
        while requests.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("nouvelle demande jamais reçue");
    // L'ancien transfert ne doit pas effacer l'entrée du nouveau.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(engine.watched_programs().await, vec![JUPITER_V6]);
    assert!(engine.stream().is_subscribed(&JUPITER_V6).await);

    engine.shutdown().await;
}
