// DANS : src/parser/envelope.rs

//! Lecture typée et minimale des notifications du fournisseur.
//!
//! Deux schémas sont supportés :
//! - `V1` : `params.result.value.{signature, err, logs, pubkey, transaction, meta}`
//!   (logsNotification et formats enrichis dérivés) ;
//! - `V2` : `params.result.{signature, transaction.{transaction, meta}}`
//!   (transactionNotification enrichi).
//!
//! Seuls les champs utiles sont désérialisés, le reste est ignoré par serde.

use serde::Deserialize;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    V1,
    V2,
}

/// Une clé de compte : chaîne simple (encodage json) ou objet (encodage jsonParsed).
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum AccountKey {
    Plain(String),
    Parsed {
        pubkey: String,
        #[serde(default)]
        signer: bool,
    },
}

impl AccountKey {
    pub fn pubkey(&self) -> &str {
        match self {
            Self::Plain(key) => key,
            Self::Parsed { pubkey, .. } => pubkey,
        }
    }

    /// En encodage simple, seul le payeur (index 0) est connu comme signataire.
    pub fn is_signer(&self, index: usize) -> bool {
        match self {
            Self::Plain(_) => index == 0,
            Self::Parsed { signer, .. } => *signer,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenAmount {
    pub amount: String,
    #[serde(default)]
    pub decimals: u8,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    #[serde(default)]
    pub account_index: Option<usize>,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub ui_token_amount: UiTokenAmount,
}

impl TokenBalance {
    pub fn raw_amount(&self) -> Option<u128> {
        self.ui_token_amount.amount.parse().ok()
    }
}

// --- Structures miroirs (désérialisation partielle) ---

#[derive(Deserialize)]
struct Envelope {
    params: Option<Params>,
}

#[derive(Deserialize)]
struct Params {
    result: Option<NotificationResult>,
}

#[derive(Deserialize)]
struct NotificationResult {
    signature: Option<String>,
    transaction: Option<TransactionWithMeta>,
    value: Option<ValueV1>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionWithMeta {
    transaction: Option<TransactionBody>,
    meta: Option<Meta>,
    block_time: Option<i64>,
}

#[derive(Deserialize)]
struct TransactionBody {
    #[serde(default)]
    signatures: Vec<String>,
    message: Option<MessageBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageBody {
    #[serde(default)]
    account_keys: Vec<AccountKey>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    fee: u64,
    #[serde(default)]
    pre_balances: Vec<u64>,
    #[serde(default)]
    post_balances: Vec<u64>,
    pre_token_balances: Option<Vec<TokenBalance>>,
    post_token_balances: Option<Vec<TokenBalance>>,
    log_messages: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValueV1 {
    signature: Option<String>,
    #[serde(default)]
    err: Option<Value>,
    logs: Option<Vec<String>>,
    pubkey: Option<String>,
    transaction: Option<TransactionBody>,
    meta: Option<Meta>,
    block_time: Option<i64>,
}

/// Vue normalisée d'une transaction, quel que soit le schéma d'origine.
#[derive(Debug, Clone)]
pub struct TxView {
    pub schema: Schema,
    pub signature: Option<String>,
    /// Le sujet de la notification (`value.pubkey`), s'il existe.
    pub subject: Option<String>,
    pub account_keys: Vec<AccountKey>,
    pub logs: Option<Vec<String>>,
    pub failed: bool,
    pub fee: u64,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Option<Vec<TokenBalance>>,
    pub post_token_balances: Option<Vec<TokenBalance>>,
    pub block_time: Option<i64>,
}

impl TxView {
    /// Le portefeuille à l'origine de la transaction : premier signataire,
    /// sinon le sujet de la notification.
    pub fn wallet(&self) -> Option<String> {
        self.account_keys
            .iter()
            .enumerate()
            .find(|(index, key)| key.is_signer(*index))
            .map(|(_, key)| key.pubkey().to_string())
            .or_else(|| self.subject.clone())
    }

    pub fn key_index(&self, pubkey: &str) -> Option<usize> {
        self.account_keys.iter().position(|key| key.pubkey() == pubkey)
    }

    pub fn key_at(&self, index: usize) -> Option<&str> {
        self.account_keys.get(index).map(AccountKey::pubkey)
    }

    pub fn has_token_balances(&self) -> bool {
        self.pre_token_balances.is_some() && self.post_token_balances.is_some()
    }
}

fn is_failed(err: &Option<Value>) -> bool {
    matches!(err, Some(value) if !value.is_null())
}

pub fn read_transaction(raw: &str) -> Result<TxView, ParseError> {
    let envelope: Envelope = serde_json::from_str(raw).map_err(|_| ParseError::Malformed("JSON invalide"))?;
    let result = envelope
        .params
        .and_then(|p| p.result)
        .ok_or(ParseError::Malformed("notification sans params.result"))?;

    if let Some(wrapper) = result.transaction {
        let meta = wrapper.meta;
        let body = wrapper.transaction;
        let signature = result
            .signature
            .or_else(|| body.as_ref().and_then(|b| b.signatures.first().cloned()));
        return Ok(build_view(Schema::V2, signature, None, body, meta, None, None, wrapper.block_time));
    }

    if let Some(value) = result.value {
        let signature = value
            .signature
            .or_else(|| value.transaction.as_ref().and_then(|b| b.signatures.first().cloned()));
        return Ok(build_view(
            Schema::V1,
            signature,
            value.pubkey,
            value.transaction,
            value.meta,
            value.logs,
            Some(is_failed(&value.err)),
            value.block_time,
        ));
    }

    Err(ParseError::Malformed("schéma de notification inconnu"))
}

#[allow(clippy::too_many_arguments)]
fn build_view(
    schema: Schema,
    signature: Option<String>,
    subject: Option<String>,
    body: Option<TransactionBody>,
    meta: Option<Meta>,
    logs: Option<Vec<String>>,
    failed: Option<bool>,
    block_time: Option<i64>,
) -> TxView {
    let account_keys = body.and_then(|b| b.message).map(|m| m.account_keys).unwrap_or_default();
    let (meta_failed, fee, pre_balances, post_balances, pre_tokens, post_tokens, meta_logs) = match meta {
        Some(meta) => (
            is_failed(&meta.err),
            meta.fee,
            meta.pre_balances,
            meta.post_balances,
            meta.pre_token_balances,
            meta.post_token_balances,
            meta.log_messages,
        ),
        None => (false, 0, Vec::new(), Vec::new(), None, None, None),
    };
    TxView {
        schema,
        signature: signature.filter(|s| !s.is_empty()),
        subject,
        account_keys,
        logs: logs.or(meta_logs),
        failed: failed.unwrap_or(false) || meta_failed,
        fee,
        pre_balances,
        post_balances,
        pre_token_balances: pre_tokens,
        post_token_balances: post_tokens,
        block_time,
    }
}

// --- Pré-filtre : extraction de l'adresse candidate ---

#[derive(Deserialize)]
struct CandidateFrame {
    params: Option<CandidateParams>,
}

#[derive(Deserialize)]
struct CandidateParams {
    result: Option<CandidateResult>,
}

#[derive(Deserialize)]
struct CandidateResult {
    transaction: Option<CandidateWrapper>,
    value: Option<CandidateValue>,
}

#[derive(Deserialize)]
struct CandidateWrapper {
    transaction: Option<CandidateBody>,
}

#[derive(Deserialize)]
struct CandidateBody {
    message: Option<MessageBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidateValue {
    pubkey: Option<String>,
    account_data: Option<Vec<AccountDataEntry>>,
    transaction: Option<CandidateBody>,
}

#[derive(Deserialize)]
struct AccountDataEntry {
    account: String,
}

fn first_signer(body: Option<CandidateBody>) -> Option<String> {
    body?
        .message?
        .account_keys
        .into_iter()
        .enumerate()
        .find(|(index, key)| key.is_signer(*index))
        .map(|(_, key)| key.pubkey().to_string())
}

/// Pré-filtre bon marché : l'adresse qui sera confrontée au registre.
/// Des faux positifs sont possibles (le registre tranche), pas de faux négatifs
/// pour les formats auxquels le client s'abonne.
pub fn extract_candidate_address(raw: &str) -> Option<Pubkey> {
    let frame: CandidateFrame = serde_json::from_str(raw).ok()?;
    let result = frame.params?.result?;

    let candidate = match (result.transaction, result.value) {
        (Some(wrapper), _) => first_signer(wrapper.transaction),
        (None, Some(value)) => value
            .pubkey
            .or_else(|| value.account_data.and_then(|d| d.into_iter().next()).map(|d| d.account))
            .or_else(|| first_signer(value.transaction)),
        (None, None) => None,
    }?;
    Pubkey::from_str(&candidate).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn v2_candidate_is_the_first_signer() {
        let signer = Pubkey::new_unique();
        let other = Pubkey::new_unique();
        let raw = json!({
            "params": {"subscription": 1, "result": {
                "signature": "sig",
                "transaction": {"transaction": {"message": {"accountKeys": [
                    {"pubkey": other.to_string(), "signer": false},
                    {"pubkey": signer.to_string(), "signer": true}
                ]}}}
            }}
        });
        assert_eq!(extract_candidate_address(&raw.to_string()), Some(signer));
    }

    #[test]
    fn v1_candidate_falls_back_through_known_fields() {
        let subject = Pubkey::new_unique();
        let raw = json!({"params": {"result": {"value": {"pubkey": subject.to_string()}}}});
        assert_eq!(extract_candidate_address(&raw.to_string()), Some(subject));

        let payer = Pubkey::new_unique();
        let raw = json!({"params": {"result": {"value": {
            "signature": "sig",
            "transaction": {"message": {"accountKeys": [payer.to_string()]}}
        }}}});
        assert_eq!(extract_candidate_address(&raw.to_string()), Some(payer));

        let account = Pubkey::new_unique();
        let raw = json!({"params": {"result": {"value": {"accountData": [{"account": account.to_string()}]}}}});
        assert_eq!(extract_candidate_address(&raw.to_string()), Some(account));
    }

    #[test]
    fn plain_logs_have_no_candidate() {
        let raw = json!({"params": {"result": {"value": {"signature": "sig", "err": null, "logs": []}}}});
        assert_eq!(extract_candidate_address(&raw.to_string()), None);
        assert_eq!(extract_candidate_address("pas du json"), None);
        let raw = json!({"params": {"result": {"value": {"pubkey": "pas-une-adresse"}}}});
        assert_eq!(extract_candidate_address(&raw.to_string()), None);
    }

    #[test]
    fn envelope_schemas_are_normalized() {
        let raw = json!({"params": {"result": {"value": {
            "signature": "abc", "err": {"InstructionError": [0, "Custom"]}, "logs": ["Program x invoke [1]"]
        }}}});
        let view = read_transaction(&raw.to_string()).expect("v1");
        assert_eq!(view.schema, Schema::V1);
        assert_eq!(view.signature.as_deref(), Some("abc"));
        assert!(view.failed);

        let raw = json!({"params": {"result": {
            "transaction": {
                "transaction": {"signatures": ["xyz"], "message": {"accountKeys": ["a", "b"]}},
                "meta": {"err": null, "fee": 5000, "logMessages": [], "preBalances": [10], "postBalances": [5]}
            }
        }}});
        let view = read_transaction(&raw.to_string()).expect("v2");
        assert_eq!(view.schema, Schema::V2);
        assert_eq!(view.signature.as_deref(), Some("xyz"));
        assert_eq!(view.wallet().as_deref(), Some("a"));
        assert_eq!(view.fee, 5000);
        assert!(!view.failed);
        assert!(!view.has_token_balances());

        assert!(matches!(read_transaction("{}"), Err(ParseError::Malformed(_))));
        assert!(matches!(read_transaction("]"), Err(ParseError::Malformed(_))));
    }
}
