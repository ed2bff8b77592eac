// DANS : src/parser/mod.rs

//! Fonctions pures : message brut -> adresse candidate | swap | création de pool | ordre limite.

pub mod balances;
pub mod envelope;
pub mod events;
pub mod programs;

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::error::ParseError;
use envelope::{TxView, read_transaction};
use programs::{JUPITER_LIMIT_ORDER, KnownPrograms, METEORA_DLMM, PUMP_AMM, RAYDIUM_AMM_V4, RAYDIUM_CPMM, invoked_programs};

pub use envelope::extract_candidate_address;

/// Mints de remplacement quand les soldes sont indisponibles (approximation documentée).
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// Mints et montants issus du diff des soldes.
    Exact,
    /// Mints de remplacement, montants éventuellement issus des événements.
    Approximate,
}

impl Precision {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Approximate => "approximate",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapInfo {
    pub signature: String,
    pub wallet: Pubkey,
    pub program_id: Pubkey,
    pub input_mint: String,
    pub output_mint: String,
    pub input_amount: u64,
    pub output_amount: u64,
    pub timestamp: i64,
    pub precision: Precision,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolInfo {
    pub signature: String,
    pub program_id: Pubkey,
    pub pool_address: Option<Pubkey>,
    pub base_mint: String,
    pub quote_mint: String,
    pub creator: Option<Pubkey>,
    pub timestamp: i64,
    pub precision: Precision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Open,
    Cancelled,
    Filled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderInfo {
    pub signature: String,
    pub order: Option<Pubkey>,
    pub maker: Pubkey,
    pub input_mint: Option<String>,
    pub output_mint: Option<String>,
    pub amount: u64,
    pub status: OrderStatus,
    pub timestamp: i64,
}

fn timestamp_of(view: &TxView) -> i64 {
    view.block_time.unwrap_or_else(|| chrono::Utc::now().timestamp())
}

fn required_signature(view: &TxView) -> Result<String, ParseError> {
    view.signature.clone().ok_or(ParseError::Malformed("signature absente"))
}

fn required_logs(view: &TxView) -> Result<&[String], ParseError> {
    view.logs.as_deref().ok_or(ParseError::Malformed("logs absents"))
}

fn required_wallet(view: &TxView) -> Result<Pubkey, ParseError> {
    let wallet = view.wallet().ok_or(ParseError::Malformed("portefeuille introuvable"))?;
    Pubkey::from_str(&wallet).map_err(|_| ParseError::Malformed("portefeuille invalide"))
}

/// Parsing complet d'un swap, après confirmation par le registre.
///
/// `NotRecognized` : transaction échouée ou aucun programme de swap connu dans les logs.
/// `Malformed` : signature, logs ou portefeuille manquants.
pub fn parse_swap(raw: &str, known_programs: &KnownPrograms) -> Result<SwapInfo, ParseError> {
    let view = read_transaction(raw)?;
    let signature = required_signature(&view)?;
    let logs = required_logs(&view)?;
    if view.failed {
        return Err(ParseError::NotRecognized);
    }
    let program_id = known_programs.find_in_logs(logs).ok_or(ParseError::NotRecognized)?;
    let wallet = required_wallet(&view)?;
    let timestamp = timestamp_of(&view);

    if let Some(legs) = balances::infer_swap_legs(&view, &wallet.to_string()) {
        return Ok(SwapInfo {
            signature,
            wallet,
            program_id,
            input_mint: legs.input_mint,
            output_mint: legs.output_mint,
            input_amount: legs.input_amount,
            output_amount: legs.output_amount,
            timestamp,
            precision: Precision::Exact,
        });
    }

    // Pas de soldes exploitables : mints de remplacement, montants des événements si possible.
    let (input_amount, output_amount) = events::find_pump_trade(logs)
        .filter(|trade| trade.user() == &wallet)
        .map(|trade| trade.amounts())
        .unwrap_or((0, 0));
    Ok(SwapInfo {
        signature,
        wallet,
        program_id,
        input_mint: WSOL_MINT.to_string(),
        output_mint: USDC_MINT.to_string(),
        input_amount,
        output_amount,
        timestamp,
        precision: Precision::Approximate,
    })
}

/// Marqueurs de création de pool, par programme.
const POOL_INIT_MARKERS: &[(Pubkey, &str)] = &[
    (RAYDIUM_AMM_V4, "initialize2"),
    (RAYDIUM_CPMM, "Instruction: Initialize"),
    (PUMP_AMM, "Instruction: CreatePool"),
    (METEORA_DLMM, "Instruction: InitializeLbPair"),
];

pub fn parse_pool_init(raw: &str) -> Result<PoolInfo, ParseError> {
    let view = read_transaction(raw)?;
    let signature = required_signature(&view)?;
    let logs = required_logs(&view)?;
    if view.failed {
        return Err(ParseError::NotRecognized);
    }
    let invoked: Vec<Pubkey> = invoked_programs(logs).collect();
    let program_id = POOL_INIT_MARKERS
        .iter()
        .find(|(program, marker)| invoked.contains(program) && logs.iter().any(|log| log.contains(marker)))
        .map(|(program, _)| *program)
        .ok_or(ParseError::NotRecognized)?;

    // Le compte du pool est la deuxième clé de la transaction (heuristique).
    let pool_address = view.key_at(1).and_then(|key| Pubkey::from_str(key).ok());
    let creator = view.wallet().and_then(|w| Pubkey::from_str(&w).ok());

    let mut mints: Vec<String> = Vec::new();
    for balance in view.post_token_balances.iter().flatten() {
        if !mints.contains(&balance.mint) {
            mints.push(balance.mint.clone());
        }
    }
    let (base_mint, quote_mint, precision) = match mints.as_slice() {
        [a, b, ..] if a == WSOL_MINT => (b.clone(), a.clone(), Precision::Exact),
        [a, b, ..] => (a.clone(), b.clone(), Precision::Exact),
        _ => (WSOL_MINT.to_string(), USDC_MINT.to_string(), Precision::Approximate),
    };

    Ok(PoolInfo {
        signature,
        program_id,
        pool_address,
        base_mint,
        quote_mint,
        creator,
        timestamp: timestamp_of(&view),
        precision,
    })
}

pub fn parse_limit_order(raw: &str) -> Result<OrderInfo, ParseError> {
    let view = read_transaction(raw)?;
    let signature = required_signature(&view)?;
    let logs = required_logs(&view)?;
    if view.failed || !invoked_programs(logs).any(|p| p == JUPITER_LIMIT_ORDER) {
        return Err(ParseError::NotRecognized);
    }
    let status = if logs.iter().any(|l| l.contains("Instruction: InitializeOrder")) {
        OrderStatus::Open
    } else if logs.iter().any(|l| l.contains("Instruction: CancelOrder")) {
        OrderStatus::Cancelled
    } else if logs.iter().any(|l| l.contains("Instruction: Fill")) {
        OrderStatus::Filled
    } else {
        return Err(ParseError::NotRecognized);
    };
    let maker = required_wallet(&view)?;

    // Le compte d'ordre est un signataire secondaire à la création, sinon la deuxième clé.
    let order = view
        .account_keys
        .iter()
        .enumerate()
        .skip(1)
        .find(|(index, key)| key.is_signer(*index))
        .map(|(_, key)| key.pubkey())
        .or_else(|| view.key_at(1))
        .and_then(|key| Pubkey::from_str(key).ok());

    let deltas = balances::token_deltas(&view, &maker.to_string()).unwrap_or_default();
    let input = deltas.iter().filter(|(_, d)| **d < 0).min_by_key(|(_, d)| **d);
    let output = deltas.iter().filter(|(_, d)| **d > 0).max_by_key(|(_, d)| **d);

    Ok(OrderInfo {
        signature,
        order,
        maker,
        input_mint: input.map(|(mint, _)| mint.clone()),
        output_mint: output.map(|(mint, _)| mint.clone()),
        amount: input.map(|(_, d)| d.unsigned_abs().min(u64::MAX as u128) as u64).unwrap_or(0),
        status,
        timestamp: timestamp_of(&view),
    })
}
