// DANS : src/monitoring/metrics.rs

use lazy_static::lazy_static;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, TextEncoder,
    register_int_counter, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
};
use tracing::{error, info};
use warp::Filter;

lazy_static! {
    // --- Registre ---
    pub static ref MONITORED_ADDRESSES: IntGauge = register_int_gauge!(
        "fanout_monitored_addresses", "Nombre d'adresses actuellement surveillées dans le registre"
    ).unwrap();
    pub static ref REGISTRY_ERRORS: IntCounterVec = register_int_counter_vec!(
        "fanout_registry_errors_total",
        "Erreurs du registre, par opération",
        &["op"] // Labels: "is_monitored", "get_subscribers", "full_resync"...
    ).unwrap();
    pub static ref RESYNC_TOTAL: IntCounterVec = register_int_counter_vec!(
        "fanout_resync_total",
        "Resynchronisations complètes du registre",
        &["outcome"] // Labels: "success" / "failure"
    ).unwrap();

    // --- Files bornées (les pertes silencieuses doivent être visibles ici) ---
    pub static ref QUEUE_DEPTH: IntGaugeVec = register_int_gauge_vec!(
        "fanout_queue_depth",
        "Profondeur courante des files bornées",
        &["queue"] // Labels: "raw_events", "notifications"
    ).unwrap();
    pub static ref QUEUE_DROPPED: IntCounterVec = register_int_counter_vec!(
        "fanout_queue_dropped_total",
        "Messages abandonnés parce que la file était pleine",
        &["queue"] // Labels: "subscription", "raw_events", "notifications"
    ).unwrap();

    // --- Stream ---
    pub static ref STREAM_MESSAGES_RECEIVED: IntCounter = register_int_counter!(
        "fanout_stream_messages_received_total", "Nombre total de messages reçus du stream"
    ).unwrap();
    pub static ref STREAM_RECONNECTS: IntCounter = register_int_counter!(
        "fanout_stream_reconnects_total", "Nombre de reconnexions au stream"
    ).unwrap();
    pub static ref STREAM_CONNECTED: IntGauge = register_int_gauge!(
        "fanout_stream_connected", "1 si la connexion au stream est active"
    ).unwrap();

    // --- Parsing & Matching ---
    pub static ref PARSE_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "fanout_parse_outcomes_total",
        "Résultats du traitement d'un événement brut",
        &["outcome"] // Labels: "no_candidate", "not_monitored", "not_recognized", "malformed"...
    ).unwrap();
    pub static ref SWAPS_PARSED: IntCounterVec = register_int_counter_vec!(
        "fanout_swaps_parsed_total",
        "Swaps parsés, exacts ou approximatifs (mints de remplacement)",
        &["precision"] // Labels: "exact" / "approximate"
    ).unwrap();
    pub static ref MATCHES_TOTAL: IntCounter = register_int_counter!(
        "fanout_matches_total", "Événements correspondant à au moins un abonné"
    ).unwrap();

    // --- Dispatch ---
    pub static ref NOTIFICATIONS: IntCounterVec = register_int_counter_vec!(
        "fanout_notifications_total",
        "Notifications envoyées aux abonnés",
        &["outcome"] // Labels: "sent" / "failed"
    ).unwrap();
    pub static ref TRADE_HOOK: IntCounterVec = register_int_counter_vec!(
        "fanout_trade_hook_total",
        "Appels au hook d'exécution",
        &["outcome"] // Labels: "submitted", "failed", "saturated"
    ).unwrap();
}

pub async fn start_metrics_server(port: u16) {
    let metrics_route = warp::path!("metrics").map(|| {
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            error!(error = %e, "[Monitoring] Encodage des métriques impossible.");
        }
        warp::reply::with_header(buffer, "content-type", "text/plain; version=0.0.4")
    });
    info!("[Monitoring] Serveur de métriques exposé sur http://0.0.0.0:{}/metrics", port);
    warp::serve(metrics_route).run(([0, 0, 0, 0], port)).await;
}
