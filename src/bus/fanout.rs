use crate::bus::{Event, EventKind};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`]; pass it back to
/// [`EventBus::unsubscribe`] to remove the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionToken(u64);

struct Subscriber {
    token: u64,
    kind: EventKind,
    handler: EventHandler,
}

/// Process-wide publish point for pipeline events.
///
/// Delivery is best-effort and synchronous per subscriber, in subscription
/// order. A panicking subscriber is caught and logged so it never blocks
/// delivery to the rest.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_token: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.lock().expect("bus lock poisoned");
        subscribers.push(Subscriber {
            token,
            kind,
            handler,
        });
        SubscriptionToken(token)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        let mut subscribers = self.subscribers.lock().expect("bus lock poisoned");
        subscribers.retain(|s| s.token != token.0);
    }

    pub fn publish(&self, event: &Event) {
        // Clone handlers out of the lock so a slow subscriber can't hold it.
        let handlers: Vec<EventHandler> = {
            let subscribers = self.subscribers.lock().expect("bus lock poisoned");
            subscribers
                .iter()
                .filter(|s| s.kind == event.kind())
                .map(|s| s.handler.clone())
                .collect()
        };
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!("event subscriber panicked handling {:?}", event.kind());
            }
        }
    }
}
