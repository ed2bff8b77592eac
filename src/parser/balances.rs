// DANS : src/parser/balances.rs

//! Déduction des deux jambes d'un swap à partir des soldes avant/après du portefeuille.
//!
//! Les montants sont en unités brutes (pas de décimales) : lamports pour le SOL natif,
//! `uiTokenAmount.amount` pour les tokens SPL.

use std::collections::HashMap;

use super::envelope::{TokenBalance, TxView};
use super::WSOL_MINT;

/// En dessous, une variation de SOL natif est du bruit (rente, arrondi).
const NATIVE_DUST_LAMPORTS: i128 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapLegs {
    pub input_mint: String,
    pub input_amount: u64,
    pub output_mint: String,
    pub output_amount: u64,
}

fn owned_by<'a>(balances: &'a [TokenBalance], wallet: &'a str) -> impl Iterator<Item = &'a TokenBalance> + 'a {
    balances.iter().filter(move |b| b.owner.as_deref() == Some(wallet))
}

/// Variation nette par mint pour les comptes de tokens détenus par `wallet`.
pub fn token_deltas(view: &TxView, wallet: &str) -> Option<HashMap<String, i128>> {
    let pre = view.pre_token_balances.as_deref()?;
    let post = view.post_token_balances.as_deref()?;
    let mut deltas: HashMap<String, i128> = HashMap::new();
    for balance in owned_by(pre, wallet) {
        *deltas.entry(balance.mint.clone()).or_default() -= balance.raw_amount()? as i128;
    }
    for balance in owned_by(post, wallet) {
        *deltas.entry(balance.mint.clone()).or_default() += balance.raw_amount()? as i128;
    }
    Some(deltas)
}

/// Variation de lamports du portefeuille, frais de transaction réintégrés s'il est le payeur.
pub fn native_delta(view: &TxView, wallet: &str) -> i128 {
    let Some(index) = view.key_index(wallet) else {
        return 0;
    };
    let (Some(pre), Some(post)) = (view.pre_balances.get(index), view.post_balances.get(index)) else {
        return 0;
    };
    let mut delta = *post as i128 - *pre as i128;
    if index == 0 {
        delta += view.fee as i128;
    }
    delta
}

fn largest(entries: &[(String, i128)]) -> Option<(String, i128)> {
    entries.iter().max_by_key(|(_, amount)| *amount).cloned()
}

fn clamp(amount: i128) -> u64 {
    amount.clamp(0, u64::MAX as i128) as u64
}

/// Jambes du swap, ou `None` si les soldes ne permettent pas de conclure.
///
/// Le SOL natif et le wSOL sont fusionnés sous le mint wSOL. Une jambe SPL est
/// préférée à une jambe SOL quand les deux existent du même côté.
pub fn infer_swap_legs(view: &TxView, wallet: &str) -> Option<SwapLegs> {
    let mut deltas = token_deltas(view, wallet)?;
    let native = native_delta(view, wallet);
    if native.abs() > NATIVE_DUST_LAMPORTS {
        *deltas.entry(WSOL_MINT.to_string()).or_default() += native;
    }

    let mut spent_tokens = Vec::new();
    let mut received_tokens = Vec::new();
    let mut sol = 0i128;
    for (mint, delta) in deltas {
        if mint == WSOL_MINT {
            sol = delta;
        } else if delta < 0 {
            spent_tokens.push((mint, -delta));
        } else if delta > 0 {
            received_tokens.push((mint, delta));
        }
    }

    let spent = largest(&spent_tokens)
        .or_else(|| (sol < -NATIVE_DUST_LAMPORTS).then(|| (WSOL_MINT.to_string(), -sol)))?;
    let received = largest(&received_tokens)
        .or_else(|| (sol > NATIVE_DUST_LAMPORTS).then(|| (WSOL_MINT.to_string(), sol)))?;
    if spent.0 == received.0 {
        return None;
    }

    Some(SwapLegs {
        input_mint: spent.0,
        input_amount: clamp(spent.1),
        output_mint: received.0,
        output_amount: clamp(received.1),
    })
}
