// DANS : src/engine/dispatcher.rs

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::communication::{CopyTradeOrder, DispatchUnit};
use crate::monitoring::metrics;
use crate::notify::{Notifier, TradeExecutor};
use crate::queue::QueueReceiver;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// L'unique consommateur de la file de notifications.
///
/// Le débit sortant est plafonné globalement (rafale de 1). Une notification en échec
/// est loguée puis oubliée. Les ordres d'exécution automatique partent en tâche de fond,
/// bornés par un sémaphore : au-delà, l'ordre est abandonné et compté.
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    executor: Option<Arc<dyn TradeExecutor>>,
    limiter: DirectLimiter,
    trade_slots: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        executor: Option<Arc<dyn TradeExecutor>>,
        rate_per_sec: u32,
        trade_concurrency: usize,
    ) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(rate_per_sec).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);
        Self {
            notifier,
            executor,
            limiter: RateLimiter::direct(quota),
            trade_slots: Arc::new(Semaphore::new(trade_concurrency.max(1))),
        }
    }

    pub async fn run(self: Arc<Self>, queue: QueueReceiver<DispatchUnit>, shutdown: CancellationToken, tasks: TaskTracker) {
        info!("[Dispatcher] Démarrage.");
        loop {
            let unit = tokio::select! {
                _ = shutdown.cancelled() => break,
                unit = queue.recv() => match unit {
                    Some(unit) => unit,
                    None => break,
                },
            };
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.limiter.until_ready() => {}
            }
            self.deliver(unit, &tasks).await;
        }
        info!("[Dispatcher] Arrêt.");
    }

    async fn deliver(&self, unit: DispatchUnit, tasks: &TaskTracker) {
        match self.notifier.notify(&unit.subscriber, &unit.message).await {
            Ok(()) => {
                metrics::NOTIFICATIONS.with_label_values(&["sent"]).inc();
            }
            Err(e) => {
                metrics::NOTIFICATIONS.with_label_values(&["failed"]).inc();
                warn!(subscriber = %unit.subscriber, error = %e, "[Dispatcher] Notification en échec, abandonnée.");
            }
        }
        // L'ordre part même si la notification a échoué : les deux canaux sont indépendants.
        if let Some(order) = unit.order {
            self.submit_trade(order, tasks);
        }
    }

    fn submit_trade(&self, order: CopyTradeOrder, tasks: &TaskTracker) {
        let Some(executor) = self.executor.clone() else {
            debug!(subscriber = %order.subscriber, "[Dispatcher] Aucun hook d'exécution configuré.");
            return;
        };
        let permit = match self.trade_slots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                metrics::TRADE_HOOK.with_label_values(&["saturated"]).inc();
                warn!(
                    subscriber = %order.subscriber,
                    signature = %order.signature,
                    "[Dispatcher] Hook d'exécution saturé, ordre abandonné."
                );
                return;
            }
        };
        tasks.spawn(async move {
            let _permit = permit;
            match executor.execute(&order).await {
                Ok(()) => {
                    metrics::TRADE_HOOK.with_label_values(&["submitted"]).inc();
                    info!(subscriber = %order.subscriber, signature = %order.signature, "[Dispatcher] Ordre transmis.");
                }
                Err(e) => {
                    metrics::TRADE_HOOK.with_label_values(&["failed"]).inc();
                    warn!(subscriber = %order.subscriber, error = %e, "[Dispatcher] Hook d'exécution en échec.");
                }
            }
        });
    }
}
