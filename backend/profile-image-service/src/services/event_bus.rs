//! Observer registry for profile events
//!
//! Delivery is synchronous and in-process: `publish` returns after every
//! observer subscribed at that moment has run. Late subscribers never see
//! past events.

use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

use crate::domain::{EventEnvelope, ProfileEvent};

pub trait ProfileEventObserver: Send + Sync {
    fn on_event(&self, event: &EventEnvelope<ProfileEvent>);
}

impl<F> ProfileEventObserver for F
where
    F: Fn(&EventEnvelope<ProfileEvent>) + Send + Sync,
{
    fn on_event(&self, event: &EventEnvelope<ProfileEvent>) {
        self(event)
    }
}

/// Publishing side, as seen by the update coordinator
pub trait EventBroadcaster: Send + Sync {
    fn publish(&self, event: EventEnvelope<ProfileEvent>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn ProfileEventObserver>)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn ProfileEventObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    pub fn subscribe_fn<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&EventEnvelope<ProfileEvent>) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(f))
    }

    /// Returns false if the subscription was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(sub, _)| *sub != id);
        observers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.read().len()
    }
}

impl EventBroadcaster for EventBus {
    fn publish(&self, event: EventEnvelope<ProfileEvent>) {
        // Snapshot so observers can (un)subscribe while being notified
        let observers: Vec<Arc<dyn ProfileEventObserver>> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        debug!(
            event = event.data.name(),
            event_id = %event.event_id,
            owner_id = %event.data.owner_id(),
            observers = observers.len(),
            "Publishing profile event"
        );

        for observer in observers {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(&event)));
            if delivered.is_err() {
                error!(
                    event = event.data.name(),
                    event_id = %event.event_id,
                    "Profile event observer panicked"
                );
            }
        }
    }
}
