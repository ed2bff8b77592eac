// DANS : src/ingestion/protocol.rs

//! Format des requêtes JSON-RPC envoyées au fournisseur et lecture minimale des trames reçues.

use anyhow::{Result, bail};
use serde::Deserialize;
use serde_json::{Value, json};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// Le type d'abonnement demandé au fournisseur pour chaque programme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeMethod {
    /// `logsSubscribe` standard (mentions) : on reçoit signature + logs.
    Logs,
    /// `transactionSubscribe` enrichi (Helius) : transaction complète avec les soldes.
    Transaction,
}

impl FromStr for SubscribeMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "logsSubscribe" | "logs" => Ok(Self::Logs),
            "transactionSubscribe" | "transaction" => Ok(Self::Transaction),
            other => bail!("méthode d'abonnement inconnue : {other}"),
        }
    }
}

impl SubscribeMethod {
    pub fn subscribe_method(self) -> &'static str {
        match self {
            Self::Logs => "logsSubscribe",
            Self::Transaction => "transactionSubscribe",
        }
    }

    pub fn unsubscribe_method(self) -> &'static str {
        match self {
            Self::Logs => "logsUnsubscribe",
            Self::Transaction => "transactionUnsubscribe",
        }
    }

    pub fn subscribe_request(self, id: u64, program: &Pubkey, commitment: &str) -> Value {
        let program = program.to_string();
        let params = match self {
            Self::Logs => json!([
                { "mentions": [program] },
                { "commitment": commitment }
            ]),
            Self::Transaction => json!([
                {
                    "accountInclude": [program],
                    "vote": false,
                    "failed": false
                },
                {
                    "commitment": commitment,
                    "encoding": "jsonParsed",
                    "transactionDetails": "full",
                    "showRewards": false,
                    "maxSupportedTransactionVersion": 0
                }
            ]),
        };
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": self.subscribe_method(),
            "params": params,
        })
    }

    pub fn unsubscribe_request(self, id: u64, server_id: u64) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": self.unsubscribe_method(),
            "params": [server_id],
        })
    }
}

/// Ce que la boucle de lecture doit savoir d'une trame pour la router.
/// On ne désérialise rien d'autre sur ce chemin.
#[derive(Debug, Deserialize)]
struct RoutingFrame {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<Value>,
    params: Option<RoutingParams>,
}

#[derive(Debug, Deserialize)]
struct RoutingParams {
    subscription: Option<u64>,
}

#[derive(Debug, PartialEq)]
pub enum Frame {
    /// Réponse à une requête d'abonnement : l'id côté serveur.
    Ack { request_id: u64, server_id: u64 },
    /// Réponse à une requête (désabonnement, etc.) sans id d'abonnement.
    Reply { request_id: u64 },
    Rejected { request_id: u64, reason: String },
    Notification { server_id: u64 },
    Unknown,
}

pub fn classify_frame(text: &str) -> Frame {
    let Ok(frame) = serde_json::from_str::<RoutingFrame>(text) else {
        return Frame::Unknown;
    };
    if let Some(server_id) = frame.params.and_then(|p| p.subscription) {
        return Frame::Notification { server_id };
    }
    match (frame.id, frame.result, frame.error) {
        (Some(request_id), _, Some(error)) => Frame::Rejected {
            request_id,
            reason: error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
        },
        (Some(request_id), Some(result), None) => match result.as_u64() {
            Some(server_id) => Frame::Ack { request_id, server_id },
            None => Frame::Reply { request_id },
        },
        _ => Frame::Unknown,
    }
}
