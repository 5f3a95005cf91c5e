//! # Event Bus
//!
//! Fan-out of unsolicited modem output to any number of observers. Each
//! subscription owns a bounded queue; publishing never blocks, and a
//! subscriber whose queue is full simply misses that event.
//!
//! ```rust
//! use modem_rs::event_bus::EventBus;
//!
//! # tokio_test::block_on(async {
//! let bus: EventBus<String> = EventBus::new();
//! let (mut rx, cancel) = bus.subscribe(8);
//! bus.publish("+CMTI: \"SM\",3".to_string());
//! assert_eq!(rx.recv().await.as_deref(), Some("+CMTI: \"SM\",3"));
//! cancel.cancel();
//! assert_eq!(rx.recv().await, None);
//! # });
//! ```

use log::{debug, trace};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Queue capacity used when a subscriber asks for 0.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 100;

#[derive(Debug)]
struct Subscribers<T> {
    next_id: AtomicU64,
    senders: RwLock<HashMap<u64, mpsc::Sender<T>>>,
}

impl<T> Subscribers<T> {
    fn remove(&self, id: u64) -> bool {
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }
}

/// Broadcast primitive with explicitly cancelled subscriptions.
#[derive(Debug)]
pub struct EventBus<T> {
    inner: Arc<Subscribers<T>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> EventBus<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Subscribers {
                next_id: AtomicU64::new(1),
                senders: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Registers a subscriber with a queue of `buffer` events
    /// ([`DEFAULT_SUBSCRIBER_BUFFER`] when 0).
    pub fn subscribe(&self, buffer: usize) -> (mpsc::Receiver<T>, CancelHandle<T>) {
        let capacity = if buffer == 0 {
            DEFAULT_SUBSCRIBER_BUFFER
        } else {
            buffer
        };
        let (tx, rx) = mpsc::channel(capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        debug!("Event bus subscriber {id} registered (buffer {capacity})");

        (
            rx,
            CancelHandle {
                id,
                subscribers: Arc::clone(&self.inner),
            },
        )
    }

    /// Offers `event` to every current subscriber without waiting.
    ///
    /// Returns the number of subscribers that accepted it.
    pub fn publish(&self, event: T) -> usize {
        let snapshot: Vec<(u64, mpsc::Sender<T>)> = self
            .inner
            .senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in snapshot {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => trace!("Subscriber {id} queue full, event dropped"),
                Err(TrySendError::Closed(_)) => {
                    // Receiver dropped without cancelling.
                    self.inner.remove(id);
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Ends one subscription. Cancelling closes the subscriber's queue once
/// buffered events are drained; repeated calls do nothing.
#[derive(Debug)]
pub struct CancelHandle<T> {
    id: u64,
    subscribers: Arc<Subscribers<T>>,
}

impl<T> Clone for CancelHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T> CancelHandle<T> {
    pub fn cancel(&self) {
        if self.subscribers.remove(self.id) {
            debug!("Event bus subscriber {} cancelled", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let (mut a, _ca) = bus.subscribe(4);
        let (mut b, _cb) = bus.subscribe(4);
        assert_eq!(bus.publish(7u32), 2);
        assert_eq!(a.recv().await, Some(7));
        assert_eq!(b.recv().await, Some(7));
    }

    #[test]
    fn test_zero_buffer_uses_default() {
        let bus = EventBus::new();
        let (_rx, _cancel) = bus.subscribe(0);
        for i in 0..DEFAULT_SUBSCRIBER_BUFFER {
            assert_eq!(bus.publish(i), 1);
        }
        assert_eq!(bus.publish(0), 0);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let bus = EventBus::new();
        let (rx, _cancel) = bus.subscribe(1);
        drop(rx);
        assert_eq!(bus.publish(1u8), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_double_cancel_is_noop() {
        let bus: EventBus<u8> = EventBus::new();
        let (_rx, cancel) = bus.subscribe(1);
        cancel.cancel();
        cancel.clone().cancel();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(1), 0);
    }
}
