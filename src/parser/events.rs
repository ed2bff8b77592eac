// DANS : src/parser/events.rs

//! Événements pump.fun AMM émis dans les logs ("Program data: <base64>").
//! Utilisés pour retrouver des montants quand les soldes sont absents de la notification.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use borsh::BorshDeserialize;
use solana_sdk::pubkey::Pubkey;

const BUY_EVENT_DISCRIMINATOR: [u8; 8] = [103, 244, 82, 31, 44, 245, 119, 119];
const SELL_EVENT_DISCRIMINATOR: [u8; 8] = [62, 47, 55, 10, 165, 3, 220, 42];

#[derive(BorshDeserialize, Debug)]
pub struct PumpBuyEvent {
    pub timestamp: i64,
    pub base_amount_out: u64,
    pub max_quote_amount_in: u64,
    pub user_base_token_reserves: u64,
    pub user_quote_token_reserves: u64,
    pub pool_base_token_reserves: u64,
    pub pool_quote_token_reserves: u64,
    pub quote_amount_in: u64,
    pub lp_fee_basis_points: u64,
    pub lp_fee: u64,
    pub protocol_fee_basis_points: u64,
    pub protocol_fee: u64,
    pub quote_amount_in_with_lp_fee: u64,
    pub user_quote_amount_in: u64,
    pub pool: Pubkey,
    pub user: Pubkey,
}

#[derive(BorshDeserialize, Debug)]
pub struct PumpSellEvent {
    pub timestamp: i64,
    pub base_amount_in: u64,
    pub min_quote_amount_out: u64,
    pub user_base_token_reserves: u64,
    pub user_quote_token_reserves: u64,
    pub pool_base_token_reserves: u64,
    pub pool_quote_token_reserves: u64,
    pub quote_amount_out: u64,
    pub lp_fee_basis_points: u64,
    pub lp_fee: u64,
    pub protocol_fee_basis_points: u64,
    pub protocol_fee: u64,
    pub quote_amount_out_without_lp_fee: u64,
    pub user_quote_amount_out: u64,
    pub pool: Pubkey,
    pub user: Pubkey,
}

#[derive(Debug)]
pub enum PumpTrade {
    Buy(PumpBuyEvent),
    Sell(PumpSellEvent),
}

impl PumpTrade {
    pub fn user(&self) -> &Pubkey {
        match self {
            Self::Buy(event) => &event.user,
            Self::Sell(event) => &event.user,
        }
    }

    /// (montant dépensé, montant reçu) du point de vue de l'utilisateur.
    pub fn amounts(&self) -> (u64, u64) {
        match self {
            Self::Buy(event) => (event.user_quote_amount_in, event.base_amount_out),
            Self::Sell(event) => (event.base_amount_in, event.user_quote_amount_out),
        }
    }
}

/// Premier achat/vente pump.fun trouvé dans les logs.
/// Les champs ajoutés après `user` par les versions récentes du programme sont ignorés.
pub fn find_pump_trade(logs: &[String]) -> Option<PumpTrade> {
    logs.iter()
        .filter_map(|log| log.strip_prefix("Program data: "))
        .filter_map(|data| STANDARD.decode(data.trim()).ok())
        .find_map(|bytes| {
            if bytes.len() <= 8 {
                return None;
            }
            let mut payload = &bytes[8..];
            if bytes.starts_with(&BUY_EVENT_DISCRIMINATOR) {
                PumpBuyEvent::deserialize(&mut payload).ok().map(PumpTrade::Buy)
            } else if bytes.starts_with(&SELL_EVENT_DISCRIMINATOR) {
                PumpSellEvent::deserialize(&mut payload).ok().map(PumpTrade::Sell)
            } else {
                None
            }
        })
}

#[cfg(test)]
pub(crate) fn encode_buy_event_log(user: &Pubkey, quote_in: u64, base_out: u64) -> String {
    let mut bytes = BUY_EVENT_DISCRIMINATOR.to_vec();
    bytes.extend_from_slice(&1_700_000_000i64.to_le_bytes());
    bytes.extend_from_slice(&base_out.to_le_bytes());
    // max_quote_amount_in .. quote_amount_in_with_lp_fee
    for _ in 0..11 {
        bytes.extend_from_slice(&0u64.to_le_bytes());
    }
    bytes.extend_from_slice(&quote_in.to_le_bytes());
    bytes.extend_from_slice(Pubkey::new_unique().as_ref());
    bytes.extend_from_slice(user.as_ref());
    // Champs supplémentaires des versions récentes.
    bytes.extend_from_slice(&[0u8; 40]);
    format!("Program data: {}", STANDARD.encode(bytes))
}
