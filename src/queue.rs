// DANS : src/queue.rs

//! Files bornées entre les étages du pipeline.
//!
//! Le producteur n'attend jamais : `offer` échoue immédiatement si la file est pleine,
//! incrémente le compteur de pertes et abandonne le message.
//! Les consommateurs (workers, dispatcher) partagent un seul récepteur.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::TrySendError;

use crate::error::QueueError;
use crate::monitoring::metrics;

pub fn bounded_queue<T>(name: &'static str, capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    metrics::QUEUE_DEPTH.with_label_values(&[name]).set(0);
    (
        QueueSender { name, capacity, tx, dropped: dropped.clone() },
        QueueReceiver { name, capacity, rx: Arc::new(Mutex::new(rx)), dropped },
    )
}

pub struct QueueSender<T> {
    name: &'static str,
    capacity: usize,
    tx: mpsc::Sender<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            capacity: self.capacity,
            tx: self.tx.clone(),
            dropped: self.dropped.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// Envoi non bloquant. Une file pleine compte exactement une perte par message refusé.
    pub fn offer(&self, item: T) -> Result<(), QueueError> {
        match self.tx.try_send(item) {
            Ok(()) => {
                self.update_depth();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::QUEUE_DROPPED.with_label_values(&[self.name]).inc();
                Err(QueueError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    pub fn depth(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn update_depth(&self) {
        metrics::QUEUE_DEPTH.with_label_values(&[self.name]).set(self.depth() as i64);
    }
}

/// Récepteur partagé entre plusieurs consommateurs concurrents.
pub struct QueueReceiver<T> {
    name: &'static str,
    capacity: usize,
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            capacity: self.capacity,
            rx: self.rx.clone(),
            dropped: self.dropped.clone(),
        }
    }
}

impl<T> QueueReceiver<T> {
    /// Attend le prochain message. `None` quand tous les émetteurs sont fermés.
    pub async fn recv(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        let item = rx.recv().await;
        metrics::QUEUE_DEPTH.with_label_values(&[self.name]).set(rx.len() as i64);
        item
    }

    pub async fn try_recv(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        let item = rx.try_recv().ok();
        metrics::QUEUE_DEPTH.with_label_values(&[self.name]).set(rx.len() as i64);
        item
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
