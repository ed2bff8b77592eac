// DANS : src/engine/matcher.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use crate::communication::{CopyTradeOrder, DispatchUnit, RawEvent, SubscriberId, SubscriptionParams};
use crate::error::{ParseError, QueueError};
use crate::monitoring::metrics;
use crate::parser::programs::KnownPrograms;
use crate::parser::{Precision, SwapInfo, extract_candidate_address, parse_swap};
use crate::queue::QueueSender;
use crate::registry::InterestRegistry;

/// Ce qu'il est advenu d'un événement brut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    NoCandidate,
    NotMonitored,
    RegistryUnavailable,
    NotRecognized,
    Malformed,
    NoSubscribers,
    Dispatched { units: usize, dropped: usize },
}

impl MatchOutcome {
    fn as_label(self) -> &'static str {
        match self {
            Self::NoCandidate => "no_candidate",
            Self::NotMonitored => "not_monitored",
            Self::RegistryUnavailable => "registry_unavailable",
            Self::NotRecognized => "not_recognized",
            Self::Malformed => "malformed",
            Self::NoSubscribers => "no_subscribers",
            Self::Dispatched { .. } => "dispatched",
        }
    }
}

/// Étape de matching partagée par tous les workers :
/// candidat -> registre -> parsing complet -> une unité par abonné.
pub struct Matcher {
    registry: Arc<dyn InterestRegistry>,
    known_programs: Arc<KnownPrograms>,
    notifications: QueueSender<DispatchUnit>,
    deep_parses: AtomicU64,
}

impl Matcher {
    pub fn new(
        registry: Arc<dyn InterestRegistry>,
        known_programs: Arc<KnownPrograms>,
        notifications: QueueSender<DispatchUnit>,
    ) -> Self {
        Self { registry, known_programs, notifications, deep_parses: AtomicU64::new(0) }
    }

    /// Nombre de parsings complets effectués (le pré-filtre doit l'éviter au maximum).
    pub fn deep_parse_count(&self) -> u64 {
        self.deep_parses.load(Ordering::Relaxed)
    }

    pub async fn process(&self, event: &RawEvent) -> MatchOutcome {
        let outcome = self.process_inner(event).await;
        metrics::PARSE_OUTCOMES.with_label_values(&[outcome.as_label()]).inc();
        outcome
    }

    async fn process_inner(&self, event: &RawEvent) -> MatchOutcome {
        let Some(candidate) = extract_candidate_address(&event.payload) else {
            return MatchOutcome::NoCandidate;
        };

        match self.registry.is_monitored(&candidate).await {
            Ok(true) => {}
            Ok(false) => return MatchOutcome::NotMonitored,
            Err(e) => {
                metrics::REGISTRY_ERRORS.with_label_values(&["is_monitored"]).inc();
                warn!(wallet = %candidate, error = %e, "[Matcher] Registre indisponible, événement ignoré.");
                return MatchOutcome::RegistryUnavailable;
            }
        }

        self.deep_parses.fetch_add(1, Ordering::Relaxed);
        let swap = match parse_swap(&event.payload, &self.known_programs) {
            Ok(swap) => swap,
            Err(ParseError::NotRecognized) => return MatchOutcome::NotRecognized,
            Err(ParseError::Malformed(reason)) => {
                warn!(wallet = %candidate, program = %event.program, reason, "[Matcher] Payload malformé, événement ignoré.");
                return MatchOutcome::Malformed;
            }
        };
        metrics::SWAPS_PARSED.with_label_values(&[swap.precision.as_label()]).inc();
        if swap.precision == Precision::Approximate {
            info!(
                wallet = %candidate,
                signature = %swap.signature,
                "[Matcher] Soldes indisponibles : swap approximatif (mints de remplacement)."
            );
        }

        let subscribers = match self.registry.get_subscribers(&candidate).await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                metrics::REGISTRY_ERRORS.with_label_values(&["get_subscribers"]).inc();
                warn!(wallet = %candidate, error = %e, "[Matcher] Lecture des abonnés impossible.");
                return MatchOutcome::RegistryUnavailable;
            }
        };
        if subscribers.is_empty() {
            return MatchOutcome::NoSubscribers;
        }
        metrics::MATCHES_TOTAL.inc();

        let program_name = self
            .known_programs
            .name_of(&swap.program_id)
            .map(|name| name.to_string())
            .unwrap_or_else(|| swap.program_id.to_string());

        let mut units = 0;
        let mut dropped = 0;
        for (subscriber, params) in subscribers {
            let unit = build_unit(&candidate, &swap, &program_name, subscriber, params);
            match self.notifications.offer(unit) {
                Ok(()) => units += 1,
                Err(QueueError::Full) | Err(QueueError::Closed) => dropped += 1,
            }
        }
        if dropped > 0 {
            debug!(wallet = %candidate, dropped, "[Matcher] File de notifications pleine.");
        }
        MatchOutcome::Dispatched { units, dropped }
    }
}

pub fn render_message(target: &Pubkey, swap: &SwapInfo, program_name: &str, params: &SubscriptionParams) -> String {
    let mut message = format!(
        "🔔 Copy Trade déclenché !\nCible : {target}\nProgramme : {program_name}\nSwap : {} {} -> {} {}\nMontant à copier : {} SOL\nTx : {}",
        swap.input_amount, swap.input_mint, swap.output_amount, swap.output_mint, params.copy_amount_sol, swap.signature,
    );
    if swap.precision == Precision::Approximate {
        message.push_str("\n(mints et montants approximatifs)");
    }
    if !params.auto_execute {
        message.push_str("\n(exécution automatique désactivée)");
    }
    message
}

fn build_unit(
    target: &Pubkey,
    swap: &SwapInfo,
    program_name: &str,
    subscriber: SubscriberId,
    params: SubscriptionParams,
) -> DispatchUnit {
    let order = params.auto_execute.then(|| CopyTradeOrder {
        subscriber: subscriber.clone(),
        target_wallet: target.to_string(),
        signature: swap.signature.clone(),
        program_id: swap.program_id.to_string(),
        input_mint: swap.input_mint.clone(),
        output_mint: swap.output_mint.clone(),
        copy_amount_sol: params.copy_amount_sol,
        approximate: swap.precision == Precision::Approximate,
    });
    DispatchUnit {
        message: render_message(target, swap, program_name, &params),
        subscriber,
        order,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::fixtures::swap_notification;
    use crate::parser::programs::JUPITER_V6;
    use crate::queue::{QueueReceiver, bounded_queue};
    use crate::registry::MemoryInterestRegistry;

    fn event(payload: String) -> RawEvent {
        RawEvent { program: Arc::from(JUPITER_V6.to_string()), payload }
    }

    fn setup(name: &'static str, capacity: usize) -> (Arc<MemoryInterestRegistry>, Matcher, QueueReceiver<DispatchUnit>) {
        let registry = Arc::new(MemoryInterestRegistry::new());
        let (tx, rx) = bounded_queue(name, capacity);
        let matcher = Matcher::new(registry.clone(), Arc::new(KnownPrograms::default()), tx);
        (registry, matcher, rx)
    }

    #[tokio::test]
    async fn unmonitored_candidate_skips_the_deep_parse() {
        let (_registry, matcher, rx) = setup("test_matcher_unmonitored", 8);
        let raw = swap_notification(&Pubkey::new_unique(), "sig", &JUPITER_V6, true);
        assert_eq!(matcher.process(&event(raw)).await, MatchOutcome::NotMonitored);
        assert_eq!(matcher.deep_parse_count(), 0);
        assert!(rx.try_recv().await.is_none());
    }

    #[tokio::test]
    async fn single_subscriber_gets_one_unit_with_the_signature() {
        let (registry, matcher, rx) = setup("test_matcher_single", 8);
        let wallet = Pubkey::new_unique();
        let user = SubscriberId::from("u1");
        registry.add_interest(&wallet, &user, SubscriptionParams::notify_only(0.5)).await.expect("add");

        let raw = swap_notification(&wallet, "5igNaTuRe", &JUPITER_V6, true);
        assert_eq!(
            matcher.process(&event(raw)).await,
            MatchOutcome::Dispatched { units: 1, dropped: 0 }
        );
        let unit = rx.try_recv().await.expect("unité");
        assert_eq!(unit.subscriber, user);
        assert!(unit.message.contains("5igNaTuRe"));
        assert!(unit.message.contains(&wallet.to_string()));
        assert!(unit.order.is_none());
        assert!(rx.try_recv().await.is_none());
    }

    #[tokio::test]
    async fn each_subscriber_gets_its_own_params() {
        let (registry, matcher, rx) = setup("test_matcher_fanout", 8);
        let wallet = Pubkey::new_unique();
        registry
            .add_interest(&wallet, &SubscriberId::from("u1"), SubscriptionParams::notify_only(0.25))
            .await
            .expect("add");
        registry
            .add_interest(&wallet, &SubscriberId::from("u2"), SubscriptionParams { copy_amount_sol: 3.5, auto_execute: true })
            .await
            .expect("add");

        let raw = swap_notification(&wallet, "sigFanout", &JUPITER_V6, true);
        assert_eq!(
            matcher.process(&event(raw)).await,
            MatchOutcome::Dispatched { units: 2, dropped: 0 }
        );
        let mut units = vec![rx.try_recv().await.expect("u"), rx.try_recv().await.expect("u")];
        units.sort_by(|a, b| a.subscriber.cmp(&b.subscriber));
        assert_eq!(units[0].subscriber.0, "u1");
        assert!(units[0].message.contains("0.25 SOL"));
        assert!(units[0].order.is_none());
        assert_eq!(units[1].subscriber.0, "u2");
        assert!(units[1].message.contains("3.5 SOL"));
        let order = units[1].order.as_ref().expect("ordre");
        assert_eq!(order.copy_amount_sol, 3.5);
        assert_eq!(order.signature, "sigFanout");
    }

    #[tokio::test]
    async fn full_notification_queue_drops_without_blocking_others() {
        let (registry, matcher, rx) = setup("test_matcher_full", 1);
        let wallet = Pubkey::new_unique();
        for user in ["a", "b", "c"] {
            registry
                .add_interest(&wallet, &SubscriberId::from(user), SubscriptionParams::notify_only(1.0))
                .await
                .expect("add");
        }
        let raw = swap_notification(&wallet, "sig", &JUPITER_V6, true);
        assert_eq!(
            matcher.process(&event(raw)).await,
            MatchOutcome::Dispatched { units: 1, dropped: 2 }
        );
        assert_eq!(rx.dropped(), 2);
    }

    #[tokio::test]
    async fn registry_outage_counts_as_no_match() {
        let (registry, matcher, _rx) = setup("test_matcher_outage", 8);
        registry.set_unavailable(true);
        let raw = swap_notification(&Pubkey::new_unique(), "sig", &JUPITER_V6, true);
        assert_eq!(matcher.process(&event(raw)).await, MatchOutcome::RegistryUnavailable);
        assert_eq!(matcher.deep_parse_count(), 0);
    }

    #[tokio::test]
    async fn approximate_swaps_are_flagged_in_the_message() {
        let (registry, matcher, rx) = setup("test_matcher_approx", 8);
        let wallet = Pubkey::new_unique();
        registry
            .add_interest(&wallet, &SubscriberId::from("u1"), SubscriptionParams::notify_only(1.0))
            .await
            .expect("add");
        let raw = swap_notification(&wallet, "sig", &JUPITER_V6, false);
        matcher.process(&event(raw)).await;
        let unit = rx.try_recv().await.expect("unité");
        assert!(unit.message.contains("approximatifs"));
    }

    #[tokio::test]
    async fn garbage_has_no_candidate() {
        let (_registry, matcher, _rx) = setup("test_matcher_garbage", 8);
        assert_eq!(matcher.process(&event("{}".to_string())).await, MatchOutcome::NoCandidate);
    }
}
