use parking_lot::Mutex;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::mpsc;

pub type EventHandler = Arc<dyn Fn(Value) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
pub enum Subscriber {
    /// Invoked on the blocking pool for every matching event, so a slow
    /// handler never holds up the receive loop.
    Callback(EventHandler),
    /// Fed in receive order from the receive loop itself; sending never blocks.
    Channel(mpsc::UnboundedSender<Value>),
}

/// Per-session table of event subscribers keyed by method name.
#[derive(Default)]
pub struct EventRegistry {
    next_id: u64,
    subscribers: HashMap<String, Vec<(SubscriptionId, Subscriber)>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, method: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.insert(method.into(), Subscriber::Callback(Arc::new(handler)))
    }

    pub fn subscribe_channel(
        &mut self,
        method: impl Into<String>,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.insert(method.into(), Subscriber::Channel(tx));
        (id, rx)
    }

    fn insert(&mut self, method: String, subscriber: Subscriber) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers
            .entry(method)
            .or_default()
            .push((id, subscriber));
        id
    }

    /// Returns false when the id was never registered or is already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let mut removed = false;
        self.subscribers.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|(entry_id, _)| *entry_id != id);
            removed |= entries.len() != before;
            !entries.is_empty()
        });
        removed
    }

    /// Snapshot of the subscribers for one method, in registration order.
    pub fn subscribers_for(&self, method: &str) -> Vec<Subscriber> {
        self.subscribers
            .get(method)
            .map(|entries| entries.iter().map(|(_, s)| s.clone()).collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, method: &str) -> usize {
        self.subscribers.get(method).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// Delivers one event to every subscriber without blocking the caller.
/// Callback failures are logged and never reach the receive loop.
pub fn dispatch(subscribers: Vec<Subscriber>, method: &str, params: &Value) {
    for subscriber in subscribers {
        match subscriber {
            Subscriber::Callback(handler) => {
                let method = method.to_string();
                let params = params.clone();
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = handler(params) {
                        tracing::warn!("Event handler for {} failed: {:#}", method, e);
                    }
                });
            }
            Subscriber::Channel(tx) => {
                // A dropped receiver just means the waiter already finished.
                let _ = tx.send(params.clone());
            }
        }
    }
}

/// Unsubscribes everything it tracks when dropped, on every exit path.
pub struct SubscriptionGuard {
    registry: Arc<Mutex<EventRegistry>>,
    ids: Vec<SubscriptionId>,
}

impl SubscriptionGuard {
    pub fn new(registry: Arc<Mutex<EventRegistry>>) -> Self {
        Self {
            registry,
            ids: Vec::new(),
        }
    }

    pub fn track(&mut self, id: SubscriptionId) {
        self.ids.push(id);
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        for id in self.ids.drain(..) {
            registry.unsubscribe(id);
        }
    }
}
