//! Generic synchronous publish/subscribe primitive (§4.1, §9).
//!
//! Rust closures have no stable notion of identity, so "idempotent
//! subscribe/unsubscribe on the same handler identity" is modeled as an
//! opaque [`SubscriptionId`] returned by [`EventBus::subscribe`];
//! [`EventBus::unsubscribe`] with an unknown or already-removed id is a
//! no-op, which is what idempotence means here.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::error;

/// Opaque handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A list of subscriber callbacks, invoked synchronously and in
/// registration order on the publisher's own execution context.
pub struct EventBus<T> {
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber<T>)>>,
    next_id: AtomicU64,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber. Returns a token for later `unsubscribe`.
    pub fn subscribe(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .expect("event bus subscriber list poisoned")
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscriber. Idempotent: removing an id twice, or one that
    /// was never registered, is a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .lock()
            .expect("event bus subscriber list poisoned")
            .retain(|(existing, _)| *existing != id);
    }

    /// Invoke every subscriber, in registration order, synchronously. A
    /// subscriber that panics is caught and logged; later subscribers still
    /// run (§4.1 "no subscriber exception prevents delivery to later
    /// subscribers").
    pub fn publish(&self, event: &T) {
        let subscribers = self
            .subscribers
            .lock()
            .expect("event bus subscriber list poisoned")
            .clone();
        for (_, handler) in subscribers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(event)));
            if outcome.is_err() {
                error!("event bus subscriber panicked; continuing to remaining subscribers");
            }
        }
    }

    /// Number of currently registered subscribers. Exposed for tests.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("event bus subscriber list poisoned")
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn publishes_in_registration_order() {
        let bus: EventBus<u32> = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        bus.subscribe(move |v: &u32| o1.lock().unwrap().push(("first", *v)));
        bus.subscribe(move |v: &u32| o2.lock().unwrap().push(("second", *v)));
        bus.publish(&7);
        let recorded = order.lock().unwrap();
        assert_eq!(*recorded, vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus: EventBus<u32> = EventBus::new();
        let id = bus.subscribe(|_| {});
        assert_eq!(bus.subscriber_count(), 1);
        bus.unsubscribe(id);
        assert_eq!(bus.subscriber_count(), 0);
        bus.unsubscribe(id);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn panicking_subscriber_does_not_block_later_ones() {
        let bus: EventBus<u32> = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe(|_| panic!("boom"));
        bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
