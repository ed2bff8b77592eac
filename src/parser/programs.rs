// DANS : src/parser/programs.rs

use arc_swap::ArcSwap;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

pub const JUPITER_V4: Pubkey = solana_sdk::pubkey!("JUP4Fb2cqiRUcaTHdrPC8h2gNsA2ETXiPDD33WcGuJB");
pub const JUPITER_V6: Pubkey = solana_sdk::pubkey!("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4");
pub const JUPITER_LIMIT_ORDER: Pubkey = solana_sdk::pubkey!("jupoNjAxXgZ4rjzxzPMP4oxduvQsQtZzyknqvzYNrNu");
pub const RAYDIUM_AMM_V4: Pubkey = solana_sdk::pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");
pub const RAYDIUM_CPMM: Pubkey = solana_sdk::pubkey!("CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C");
pub const RAYDIUM_CLMM: Pubkey = solana_sdk::pubkey!("CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK");
pub const ORCA_WHIRLPOOL: Pubkey = solana_sdk::pubkey!("whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc");
pub const METEORA_DLMM: Pubkey = solana_sdk::pubkey!("LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo");
pub const METEORA_DAMM_V1: Pubkey = solana_sdk::pubkey!("Eo7WjKq67rjJQSZxS6z3YkapzY3eMj6Xy8X5EQVn5UaB");
pub const METEORA_DAMM_V2: Pubkey = solana_sdk::pubkey!("cpamdpZCGKUy5JxQXB4dcpGPiikHawvSWAd6mEn1sGG");
pub const PUMP_AMM: Pubkey = solana_sdk::pubkey!("pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA");
pub const PUMP_BONDING_CURVE: Pubkey = solana_sdk::pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");

const SWAP_PROGRAMS: &[(Pubkey, &str)] = &[
    (JUPITER_V4, "Jupiter v4"),
    (JUPITER_V6, "Jupiter v6"),
    (RAYDIUM_AMM_V4, "Raydium AMM v4"),
    (RAYDIUM_CPMM, "Raydium CPMM"),
    (RAYDIUM_CLMM, "Raydium CLMM"),
    (ORCA_WHIRLPOOL, "Orca Whirlpool"),
    (METEORA_DLMM, "Meteora DLMM"),
    (METEORA_DAMM_V1, "Meteora DAMM v1"),
    (METEORA_DAMM_V2, "Meteora DAMM v2"),
    (PUMP_AMM, "Pump.fun AMM"),
    (PUMP_BONDING_CURVE, "Pump.fun"),
];

/// "Program <id> invoke [n]" -> <id>. Les lignes "Program log:" et "Program data:" ne matchent pas.
pub fn program_id_from_log(log: &str) -> Option<Pubkey> {
    let mut parts = log.split_whitespace();
    if parts.next()? != "Program" {
        return None;
    }
    Pubkey::from_str(parts.next()?).ok()
}

pub fn invoked_programs(logs: &[String]) -> impl Iterator<Item = Pubkey> + '_ {
    logs.iter()
        .filter(|log| log.contains(" invoke ["))
        .filter_map(|log| program_id_from_log(log))
}

/// Liste blanche des programmes de swap reconnus.
///
/// Lue sans verrou par les workers ; un ajout publie une nouvelle table complète,
/// la logique de matching n'a donc jamais besoin d'être redémarrée.
pub struct KnownPrograms {
    table: ArcSwap<HashMap<Pubkey, Arc<str>>>,
}

impl Default for KnownPrograms {
    fn default() -> Self {
        let table = SWAP_PROGRAMS.iter().map(|(id, name)| (*id, Arc::from(*name))).collect();
        Self { table: ArcSwap::from_pointee(table) }
    }
}

impl KnownPrograms {
    pub fn empty() -> Self {
        Self { table: ArcSwap::from_pointee(HashMap::new()) }
    }

    pub fn with_extra(extra: &[Pubkey]) -> Self {
        let programs = Self::default();
        for program in extra {
            programs.add(*program, "Programme ajouté");
        }
        programs
    }

    /// Retourne `false` si le programme était déjà connu.
    pub fn add(&self, program: Pubkey, name: &str) -> bool {
        let mut added = false;
        self.table.rcu(|current| {
            let mut next = HashMap::clone(current);
            added = next.insert(program, Arc::from(name)).is_none();
            next
        });
        added
    }

    pub fn remove(&self, program: &Pubkey) -> bool {
        let mut removed = false;
        self.table.rcu(|current| {
            let mut next = HashMap::clone(current);
            removed = next.remove(program).is_some();
            next
        });
        removed
    }

    pub fn contains(&self, program: &Pubkey) -> bool {
        self.table.load().contains_key(program)
    }

    pub fn name_of(&self, program: &Pubkey) -> Option<Arc<str>> {
        self.table.load().get(program).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Premier programme connu invoqué dans les logs (l'agrégateur passe avant les AMM qu'il appelle).
    pub fn find_in_logs(&self, logs: &[String]) -> Option<Pubkey> {
        let table = self.table.load();
        invoked_programs(logs).find(|program| table.contains_key(program))
    }
}
