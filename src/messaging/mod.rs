use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::broadcast;

type AnyEvent = Arc<dyn Any + Send + Sync>;

/// In-memory event bus keyed by event type
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<DashMap<TypeId, broadcast::Sender<AnyEvent>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
        }
    }

    /// Publish an event; a no-op when nobody has subscribed to its type.
    pub fn publish<E: Clone + Send + Sync + 'static>(&self, event: E) {
        let type_id = TypeId::of::<E>();
        if let Some(sender) = self.channels.get(&type_id) {
            let _ = sender.send(Arc::new(event));
        }
    }

    pub fn subscribe<E: Clone + Send + Sync + 'static>(&self) -> EventReceiver<E> {
        let type_id = TypeId::of::<E>();
        let sender = self.channels.entry(type_id).or_insert_with(|| {
            let (tx, _) = broadcast::channel(100);
            tx
        });
        EventReceiver {
            inner: sender.subscribe(),
            _event: PhantomData,
        }
    }
}

/// Typed view over a broadcast subscription.
pub struct EventReceiver<E> {
    inner: broadcast::Receiver<AnyEvent>,
    _event: PhantomData<fn() -> E>,
}

impl<E: Clone + Send + Sync + 'static> EventReceiver<E> {
    /// Wait for the next event; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.inner.recv().await {
                Ok(event) => {
                    if let Some(event) = event.downcast_ref::<E>() {
                        return Some(event.clone());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event receiver lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take an already published event without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.inner.try_recv() {
                Ok(event) => {
                    if let Some(event) = event.downcast_ref::<E>() {
                        return Some(event.clone());
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Ping(u32);

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe::<Ping>();
        bus.publish(Ping(7));
        assert_eq!(rx.recv().await, Some(Ping(7)));
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(Ping(1));
        let mut rx = bus.subscribe::<Ping>();
        assert_eq!(rx.try_recv(), None);
    }
}
