//! Typed publish/subscribe event bus.
//!
//! Subscribers register for one topic with a predicate; `publish` delivers an
//! event to every subscriber of that topic whose predicate accepts it.
//! Handlers run on the publishing thread, after the subscriber list lock has
//! been released, so a handler may subscribe, unsubscribe or publish again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Subscription<T, E> {
    id: SubscriptionId,
    topic: T,
    predicate: Predicate<E>,
    handler: Handler<E>,
}

pub struct EventBus<T, E> {
    next_id: AtomicU64,
    subscriptions: RwLock<Vec<Subscription<T, E>>>,
}

impl<T, E> Default for EventBus<T, E> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscriptions: RwLock::new(Vec::new()),
        }
    }
}

impl<T, E> std::fmt::Debug for EventBus<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<T: PartialEq + Copy, E> EventBus<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        topic: T,
        predicate: impl Fn(&E) -> bool + Send + Sync + 'static,
        handler: impl Fn(&E) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription {
                id,
                topic,
                predicate: Arc::new(predicate),
                handler: Arc::new(handler),
            });
        id
    }

    /// Returns `false` when `id` was not subscribed (already removed).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Deliver `event` and return the number of handlers invoked.
    pub fn publish(&self, topic: T, event: &E) -> usize {
        let targets: Vec<(Predicate<E>, Handler<E>)> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| (Arc::clone(&s.predicate), Arc::clone(&s.handler)))
            .collect();

        let mut delivered = 0;
        for (predicate, handler) in targets {
            if predicate(event) {
                handler(event);
                delivered += 1;
            }
        }
        delivered
    }
}

impl<T, E> EventBus<T, E> {
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Topic {
        A,
        B,
    }

    #[test]
    fn publish_respects_topic_and_predicate() {
        let bus: EventBus<Topic, i32> = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.subscribe(Topic::A, |v| *v > 0, move |v| sink.lock().unwrap().push(*v));

        assert_eq!(bus.publish(Topic::A, &5), 1);
        assert_eq!(bus.publish(Topic::A, &-1), 0);
        assert_eq!(bus.publish(Topic::B, &7), 0);
        assert_eq!(*seen.lock().unwrap(), vec![5]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus: EventBus<Topic, i32> = EventBus::new();
        let id = bus.subscribe(Topic::A, |_| true, |_| {});
        assert_eq!(bus.subscriber_count(), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.publish(Topic::A, &1), 0);
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        let bus: Arc<EventBus<Topic, i32>> = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let inner_bus = Arc::clone(&bus);
        let inner_slot = Arc::clone(&slot);
        let id = bus.subscribe(Topic::A, |_| true, move |_| {
            if let Some(id) = *inner_slot.lock().unwrap() {
                inner_bus.unsubscribe(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        assert_eq!(bus.publish(Topic::A, &1), 1);
        assert_eq!(bus.publish(Topic::A, &1), 0);
    }
}
