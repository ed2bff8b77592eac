// Outil d'administration du registre des intérêts.
//
// Usage :
//   interest_admin add <adresse> <abonné> <montant_sol> [--auto]
//   interest_admin remove <adresse> <abonné>
//   interest_admin show <adresse>
//   interest_admin list
//   interest_admin resync

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::env;
use std::str::FromStr;

use fanout::communication::{SubscriberId, SubscriptionParams};
use fanout::registry::{InterestRegistry, InterestSource, JsonFileInterestSource, RedisInterestRegistry};

/// Seules les clés du registre sont nécessaires ici, pas celles du stream.
#[derive(Deserialize)]
struct AdminConfig {
    #[serde(default = "default_redis_url")]
    redis_url: String,
    #[serde(default = "default_interests_file")]
    interests_file: String,
}

fn default_redis_url() -> String { "redis://127.0.0.1:6379/0".to_string() }
fn default_interests_file() -> String { "interests.json".to_string() }

fn parse_address(raw: Option<&String>) -> Result<Pubkey> {
    let raw = raw.context("adresse manquante")?;
    Pubkey::from_str(raw).with_context(|| format!("adresse invalide : {raw}"))
}

fn usage() -> ! {
    eprintln!("Usage : interest_admin <add|remove|show|list|resync> [arguments]");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    fanout::monitoring::logging::setup_logging();
    dotenvy::dotenv().ok();
    let config = envy::from_env::<AdminConfig>()?;

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else { usage() };

    let registry = RedisInterestRegistry::connect(&config.redis_url).await?;

    match command.as_str() {
        "add" => {
            let address = parse_address(args.get(1))?;
            let subscriber = SubscriberId::from(args.get(2).context("abonné manquant")?.as_str());
            let amount: f64 = args
                .get(3)
                .context("montant manquant")?
                .parse()
                .context("montant invalide")?;
            if !amount.is_finite() || amount < 0.0 {
                bail!("le montant doit être un nombre positif");
            }
            let auto_execute = args.iter().any(|a| a == "--auto");
            registry
                .add_interest(&address, &subscriber, SubscriptionParams { copy_amount_sol: amount, auto_execute })
                .await?;
            println!("[OK] {subscriber} surveille {address} ({amount} SOL, auto = {auto_execute})");
        }
        "remove" => {
            let address = parse_address(args.get(1))?;
            let subscriber = SubscriberId::from(args.get(2).context("abonné manquant")?.as_str());
            registry.remove_interest(&address, &subscriber).await?;
            let still = registry.is_monitored(&address).await?;
            println!("[OK] {subscriber} retiré de {address} (toujours surveillée : {still})");
        }
        "show" => {
            let address = parse_address(args.get(1))?;
            let subscribers = registry.get_subscribers(&address).await?;
            if subscribers.is_empty() {
                println!("{address} n'est pas surveillée.");
            }
            let mut rows: Vec<_> = subscribers.into_iter().collect();
            rows.sort_by(|a, b| a.0.cmp(&b.0));
            for (subscriber, params) in rows {
                println!("{:<24} {:>10} SOL  auto = {}", subscriber.0, params.copy_amount_sol, params.auto_execute);
            }
        }
        "list" => {
            let mut addresses = registry.monitored_addresses().await?;
            addresses.sort();
            for address in &addresses {
                println!("{address}");
            }
            println!("--- {} adresse(s) surveillée(s) ---", addresses.len());
        }
        "resync" => {
            let source = JsonFileInterestSource::new(&config.interests_file);
            let interests = source.list_active_interests().await?;
            registry.full_resync(&interests).await?;
            println!("[OK] Registre resynchronisé : {} adresse(s).", registry.monitored_count().await?);
        }
        _ => usage(),
    }
    Ok(())
}
